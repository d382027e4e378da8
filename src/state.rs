//! State shared by every route handler.

use crate::{config::Config, db::Db};

/// Handed to handlers through `State<AppState>`. Cloning is cheap: the pool
/// hands out a reference-counted handle and the config is a handful of
/// strings and integers read once at startup.
#[derive(Clone)]
pub struct AppState {
    pub pool:   Db,
    pub config: Config,
}
