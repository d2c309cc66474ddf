use super::{json_pretty, EXIT_SUCCESS};
use stevedore_core::Registry;

pub fn run(json: bool) -> Result<u8, String> {
    let registry = Registry::builtin().map_err(|e| e.to_string())?;
    let names = registry.names();
    if json {
        println!("{}", json_pretty(&names)?);
    } else {
        for name in names {
            println!("{name}");
        }
    }
    Ok(EXIT_SUCCESS)
}
