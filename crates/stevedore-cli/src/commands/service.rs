use super::{json_pretty, styled_address, Session, EXIT_SUCCESS};
use stevedore_core::operations::service_destroy;
use stevedore_store::Service;

pub fn destroy(session: &Session, name: &str) -> Result<u8, String> {
    let _lock = session.lock()?;
    let result = session.run(service_destroy::NAME, session.context().with("name", name))?;
    session.report(&result)
}

pub fn list(session: &Session) -> Result<u8, String> {
    let store = session.store();
    let bucket = session.app_name();
    let mut services = Vec::new();
    for key in store
        .list_keys(&bucket)
        .map_err(|e| format!("store error: {e}"))?
    {
        let service: Service = store
            .get(&bucket, &key)
            .map_err(|e| format!("store error: {e}"))?;
        services.push(service);
    }

    if session.json {
        println!("{}", json_pretty(&services)?);
    } else if services.is_empty() {
        println!("no services in {bucket}");
    } else {
        println!(
            "{:<16} {:<16} {:<16} IMAGE",
            "NAME", "EXTERNAL", "INTERNAL"
        );
        for s in &services {
            println!(
                "{:<16} {} {} {}",
                s.name,
                styled_address(&s.external_ip, 16),
                styled_address(&s.internal_ip, 16),
                s.image
            );
        }
    }
    Ok(EXIT_SUCCESS)
}
