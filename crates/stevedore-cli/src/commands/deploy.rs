use super::{Session, EXIT_SUCCESS};
use stevedore_core::operations::deploy;
use tracing::warn;

/// A failed deploy is logged and the command still exits successfully.
pub fn run(session: &Session, alias: &str) -> Result<u8, String> {
    let _lock = session.lock()?;
    let context = session.context().with("alias", alias);
    match session.run(deploy::NAME, context) {
        Ok(result) => {
            if !session.json {
                if let Some(release) = result.get("release") {
                    println!("release {release} recorded for {alias}");
                }
            }
            session.report(&result)
        }
        Err(e) => {
            warn!("deploy to {alias} failed: {e}");
            Ok(EXIT_SUCCESS)
        }
    }
}
