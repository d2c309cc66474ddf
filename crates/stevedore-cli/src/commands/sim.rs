use super::Session;
use stevedore_core::operations::sim;

pub fn start(session: &Session) -> Result<u8, String> {
    let _lock = session.lock()?;
    let context = session
        .context()
        .with("services", sim::encode_services(&session.config.services));
    let result = session.run(sim::START, context)?;
    session.report(&result)
}

pub fn destroy(session: &Session) -> Result<u8, String> {
    let _lock = session.lock()?;
    let result = session.run(sim::DESTROY, session.context())?;
    session.report(&result)
}
