//! Built-in resolver implementations.

mod local;
mod mediafire;
mod onedrive;

use std::sync::Arc;

pub use local::LocalResolver;
pub use mediafire::MediaFireResolver;
pub use onedrive::OneDriveResolver;

use super::resolver::Resolver;
use crate::config::ResolverConfig;

/// The built-in resolvers in registration order.
pub fn builtins(config: &ResolverConfig, client: reqwest::Client) -> Vec<Arc<dyn Resolver>> {
    let mut local = LocalResolver::new(config.temp_dir());
    if let Some(dir) = &config.local_dir {
        local = local.with_local_dir(dir.clone());
    }

    vec![
        Arc::new(local),
        Arc::new(MediaFireResolver::new(client.clone())),
        Arc::new(OneDriveResolver::new(client)),
    ]
}
