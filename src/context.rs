use std::path::PathBuf;

use crate::{appconfig::KeyResolver, format::LocalZone};

// shared by every command
pub struct AppCtx {
    pub zone: LocalZone,       // captured once at startup
    pub resolver: KeyResolver, // env + search paths, nothing read yet
}

impl AppCtx {
    pub fn new(zone: LocalZone, config: Option<PathBuf>) -> Self {
        Self {
            zone,
            resolver: KeyResolver::from_env(config),
        }
    }
}
