use super::{json_pretty, Session, EXIT_SUCCESS};
use stevedore_core::operations::evars;
use stevedore_store::{meta_bucket, Evars, EVARS_KEY};

pub fn list(session: &Session) -> Result<u8, String> {
    let table: Evars = session
        .store()
        .get_or_default(&meta_bucket(session.app_id()), EVARS_KEY)
        .map_err(|e| format!("store error: {e}"))?;
    if session.json {
        println!("{}", json_pretty(&table)?);
    } else {
        for (key, value) in table.iter() {
            println!("{key}={value}");
        }
    }
    Ok(EXIT_SUCCESS)
}

pub fn set(session: &Session, pairs: &[String]) -> Result<u8, String> {
    let _lock = session.lock()?;
    let context = session
        .context()
        .with("evars", pairs.join("\n"));
    let result = session.run(evars::ADD, context)?;
    session.report(&result)
}

pub fn unset(session: &Session, keys: &[String]) -> Result<u8, String> {
    let _lock = session.lock()?;
    let result = session.run(evars::REMOVE, session.context().with("keys", keys.join(",")))?;
    session.report(&result)
}
