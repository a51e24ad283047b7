use axum::Router;

/// A service module that contributes HTTP routes.
///
/// Each module (task, collections) implements this trait to register its
/// endpoints. Paths are part of the public API, so the binary merges module
/// routers at the root instead of nesting them under `/{name}`.
pub trait Module: Send + Sync {
    /// Module name, used for logging.
    fn name(&self) -> &str;

    /// Return the module's routes with their full paths.
    fn routes(&self) -> Router;
}
