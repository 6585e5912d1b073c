use axum::extract::FromRef;

use crate::navigation::NavigationTracker;
use crate::services::currency::CurrencyConverter;
use crate::services::Services;
use crate::session::CookieSettings;

#[derive(Debug, Clone)]
pub struct AppState {
    pub services: Services,
    pub currency: CurrencyConverter,
    pub cookies: CookieSettings,
    pub navigation: NavigationTracker,
    pub max_upload_bytes: usize,
}

impl FromRef<AppState> for NavigationTracker {
    fn from_ref(state: &AppState) -> Self {
        state.navigation.clone()
    }
}
