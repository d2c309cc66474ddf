use super::{json_pretty, Session, EXIT_SUCCESS};
use stevedore_core::operations::deploy;
use stevedore_store::{App, APPS_BUCKET};

pub fn add(session: &Session, alias: &str, target: &str) -> Result<u8, String> {
    let _lock = session.lock()?;
    let context = session
        .context()
        .with("alias", alias)
        .with("target", target);
    let result = session.run(deploy::REMOTE_ADD, context)?;
    session.report(&result)
}

pub fn list(session: &Session) -> Result<u8, String> {
    let app: App = session
        .store()
        .get(APPS_BUCKET, &session.app_name())
        .map_err(|e| format!("store error: {e}"))?;
    if session.json {
        println!("{}", json_pretty(&app.remotes)?);
    } else if app.remotes.is_empty() {
        println!("no remotes registered");
    } else {
        println!("{:<16} TARGET", "ALIAS");
        for (alias, target) in &app.remotes {
            println!("{alias:<16} {target}");
        }
    }
    Ok(EXIT_SUCCESS)
}
