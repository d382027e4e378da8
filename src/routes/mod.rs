use axum::{middleware, Router};
use crate::{
    middleware::auth_guard::require_auth,
    state::AppState,
};

mod auth;
mod files;
mod paths;
mod scenarios;
mod stats;
mod subjects;
mod users;

/// Build the full `/api` router.
///
/// Public routes (register/login, catalogue reads, downloads, platform stats)
/// are left unprotected; every other route is wrapped in the bearer-token
/// [`require_auth`] middleware. Admin-only routers additionally carry their
/// own `require_admin` route layer.
/// Clamp caller-supplied pagination to `(page, limit, offset)`.
/// The offset is widened to `u64` before multiplying so a huge `page`
/// value cannot overflow `u32` arithmetic.
pub(crate) fn page_window(page: Option<u32>, limit: Option<u32>) -> (u32, u32, u64) {
    let page  = page.unwrap_or(1).max(1);
    let limit = limit.unwrap_or(10).clamp(1, 100);
    let offset = (page as u64 - 1) * limit as u64;
    (page, limit, offset)
}

pub fn all_routes(state: AppState) -> Router<AppState> {
    let auth_mw = middleware::from_fn_with_state(state.clone(), require_auth);
    let upload_limit = state.config.upload_max_bytes;
    Router::new()
        .merge(auth::router())
        .merge(subjects::router())
        .merge(files::router())
        .merge(paths::router())
        .merge(scenarios::router())
        .merge(stats::router())
        .merge(
            Router::new()
                .merge(auth::protected_router())
                .merge(files::protected_router(upload_limit))
                .merge(subjects::admin_router())
                .merge(users::admin_router())
                .merge(paths::protected_router())
                .merge(scenarios::admin_router())
                .route_layer(auth_mw),
        )
}

#[cfg(test)]
mod tests {
    use super::page_window;

    #[test]
    fn defaults_apply_when_unset() {
        assert_eq!(page_window(None, None), (1, 10, 0));
    }

    #[test]
    fn limit_is_clamped() {
        assert_eq!(page_window(Some(2), Some(1000)), (2, 100, 100));
        assert_eq!(page_window(Some(1), Some(0)), (1, 1, 0));
    }

    #[test]
    fn huge_page_does_not_overflow() {
        let (page, limit, offset) = page_window(Some(u32::MAX), Some(100));
        assert_eq!(page, u32::MAX);
        assert_eq!(limit, 100);
        assert_eq!(offset, (u32::MAX as u64 - 1) * 100);
    }
}
