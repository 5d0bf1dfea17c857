//! Config subcommand

use crate::cli::ConfigAction;
use anyhow::Result;
use containai_core::config::ConfigStore;
use containai_core::paths::Paths;

pub async fn execute(action: ConfigAction) -> Result<i32> {
    let paths = Paths::from_env()?;

    match action {
        ConfigAction::Get { key, workspace } => {
            let store = ConfigStore::load_user(&paths)?;
            match store.get(&key, workspace.as_deref()) {
                Some(value) => {
                    println!("{value}");
                    Ok(0)
                }
                None => {
                    eprintln!("{key}: not set");
                    Ok(1)
                }
            }
        }
        ConfigAction::Set {
            key,
            value,
            workspace,
        } => {
            let mut store = ConfigStore::load_user(&paths)?;
            store.set(&key, &value, workspace.as_deref())?;
            store.save()?;
            Ok(0)
        }
        ConfigAction::Unset { key, workspace } => {
            let mut store = ConfigStore::load_user(&paths)?;
            let removed = store.unset(&key, workspace.as_deref())?;
            if removed {
                store.save()?;
            }
            Ok(0)
        }
    }
}
