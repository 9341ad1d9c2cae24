pub mod storage;

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{info, warn};

use crate::config::Config;
use crate::error::AppError;
use crate::models::user::{Credentials, Role, User};
use crate::store::DataSource;
use crate::views::View;

pub use storage::{FileStorage, MemoryStorage, SessionStorage};

const CURRENT_USER_KEY: &str = "currentUser";
const THEME_KEY: &str = "theme";

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Light,
    Dark,
}

impl Theme {
    pub fn as_str(&self) -> &'static str {
        match self {
            Theme::Light => "light",
            Theme::Dark => "dark",
        }
    }

    pub fn toggled(&self) -> Theme {
        match self {
            Theme::Light => Theme::Dark,
            Theme::Dark => Theme::Light,
        }
    }
}

impl fmt::Display for Theme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Who is logged in. Injected wherever identity matters; the persisted copy
/// and the observable value change together.
pub struct AuthContext {
    storage: Arc<dyn SessionStorage>,
    current: watch::Sender<Option<User>>,
}

impl AuthContext {
    /// Loads the identity left by a previous run. A corrupt entry is dropped.
    pub fn restore(storage: Arc<dyn SessionStorage>) -> Result<Self, AppError> {
        let restored = match storage.get(CURRENT_USER_KEY)? {
            Some(raw) => match serde_json::from_str::<User>(&raw) {
                Ok(user) => Some(user),
                Err(err) => {
                    warn!(error = %err, "stored session is unreadable, clearing it");
                    storage.remove(CURRENT_USER_KEY)?;
                    None
                }
            },
            None => None,
        };

        let (current, _) = watch::channel(restored);
        Ok(Self { storage, current })
    }

    /// File-backed context at the configured session path.
    pub fn open(config: &Config) -> Result<Self, AppError> {
        Self::restore(Arc::new(FileStorage::new(config.session_file.clone())))
    }

    pub async fn login(
        &self,
        source: &dyn DataSource,
        credentials: &Credentials,
    ) -> Result<Option<User>, AppError> {
        let users = source.list_users().await?;

        match users.iter().find(|user| credentials.matches(user)) {
            Some(user) => {
                let user = user.without_password();
                let encoded = serde_json::to_string(&user)
                    .map_err(|err| AppError::Internal(format!("failed to encode user: {err}")))?;
                self.storage.set(CURRENT_USER_KEY, &encoded)?;
                self.current.send_replace(Some(user.clone()));
                info!(user_id = user.id, role = ?user.role, "logged in");
                Ok(Some(user))
            }
            None => {
                warn!(username = %credentials.username, "login rejected");
                self.logout()?;
                Ok(None)
            }
        }
    }

    pub fn logout(&self) -> Result<(), AppError> {
        self.storage.remove(CURRENT_USER_KEY)?;
        if self.current.send_replace(None).is_some() {
            info!("logged out");
        }
        Ok(())
    }

    pub fn current(&self) -> Option<User> {
        self.current.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<User>> {
        self.current.subscribe()
    }

    pub fn is_authenticated(&self) -> bool {
        self.current.borrow().is_some()
    }

    pub fn has_role(&self, role: Role) -> bool {
        self.current
            .borrow()
            .as_ref()
            .is_some_and(|user| user.role == role)
    }

    /// The current user if they may open `view`.
    pub fn require(&self, view: View) -> Result<User, AppError> {
        let user = self
            .current()
            .ok_or_else(|| AppError::Unauthorized("login required".to_string()))?;

        if view.permits(user.role) {
            Ok(user)
        } else {
            Err(AppError::Forbidden(format!(
                "{:?} users cannot open {}",
                user.role,
                view.path()
            )))
        }
    }

    pub fn theme(&self) -> Theme {
        match self.storage.get(THEME_KEY) {
            Ok(Some(raw)) => match raw.as_str() {
                "dark" => Theme::Dark,
                _ => Theme::Light,
            },
            Ok(None) => Theme::default(),
            Err(err) => {
                warn!(error = %err, "failed to read theme preference");
                Theme::default()
            }
        }
    }

    pub fn set_theme(&self, theme: Theme) -> Result<(), AppError> {
        self.storage.set(THEME_KEY, theme.as_str())
    }

    pub fn toggle_theme(&self) -> Result<Theme, AppError> {
        let next = self.theme().toggled();
        self.set_theme(next)?;
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tempfile::TempDir;

    use super::*;
    use crate::store::FixtureSource;

    fn credentials(username: &str, password: &str) -> Credentials {
        Credentials {
            username: username.to_string(),
            password: password.to_string(),
        }
    }

    #[tokio::test]
    async fn login_persists_identity_without_password() {
        let storage = Arc::new(MemoryStorage::new());
        let auth = AuthContext::restore(storage.clone()).unwrap();
        let source = FixtureSource::empty();

        let user = auth
            .login(&source, &credentials("delivery1", "del123"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(user.id, 2);
        assert!(auth.has_role(Role::Delivery));

        let stored = storage.get("currentUser").unwrap().unwrap();
        assert!(!stored.contains("del123"));
    }

    #[tokio::test]
    async fn wrong_password_clears_previous_identity() {
        let auth = AuthContext::restore(Arc::new(MemoryStorage::new())).unwrap();
        let source = FixtureSource::empty();

        auth.login(&source, &credentials("moderator1", "mod123"))
            .await
            .unwrap();
        let rejected = auth
            .login(&source, &credentials("moderator1", "nope"))
            .await
            .unwrap();

        assert!(rejected.is_none());
        assert!(!auth.is_authenticated());
    }

    #[tokio::test]
    async fn session_survives_restart_and_logout_clears_both() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("session.json");
        let source = FixtureSource::empty();

        let first = AuthContext::restore(Arc::new(FileStorage::new(&path))).unwrap();
        first
            .login(&source, &credentials("moderator1", "mod123"))
            .await
            .unwrap();

        let second = AuthContext::restore(Arc::new(FileStorage::new(&path))).unwrap();
        assert_eq!(second.current().map(|u| u.id), Some(1));

        let mut watcher = second.subscribe();
        second.logout().unwrap();
        assert!(watcher.has_changed().unwrap());
        assert!(watcher.borrow_and_update().is_none());

        let third = AuthContext::restore(Arc::new(FileStorage::new(&path))).unwrap();
        assert!(third.current().is_none());
    }

    #[tokio::test]
    async fn open_uses_configured_session_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state").join("session.json");
        let file = path.to_string_lossy().to_string();
        let config =
            Config::from_lookup(|key| (key == "SESSION_FILE").then(|| file.clone())).unwrap();

        let auth = AuthContext::open(&config).unwrap();
        auth.login(&FixtureSource::empty(), &credentials("delivery2", "del456"))
            .await
            .unwrap();

        assert!(path.exists());
        assert_eq!(AuthContext::open(&config).unwrap().current().map(|u| u.id), Some(3));
    }

    #[test]
    fn corrupt_session_entry_is_dropped() {
        let storage = Arc::new(MemoryStorage::new());
        storage.set("currentUser", "{not json").unwrap();

        let auth = AuthContext::restore(storage.clone()).unwrap();
        assert!(auth.current().is_none());
        assert_eq!(storage.get("currentUser").unwrap(), None);
    }

    #[tokio::test]
    async fn view_access_follows_role() {
        let auth = AuthContext::restore(Arc::new(MemoryStorage::new())).unwrap();
        assert!(matches!(
            auth.require(View::DeliveryList),
            Err(AppError::Unauthorized(_))
        ));

        auth.login(&FixtureSource::empty(), &credentials("delivery1", "del123"))
            .await
            .unwrap();
        assert!(auth.require(View::MyConciliations).is_ok());
        assert!(matches!(
            auth.require(View::CreateDelivery),
            Err(AppError::Forbidden(_))
        ));
    }

    #[test]
    fn theme_defaults_to_light_and_toggles() {
        let auth = AuthContext::restore(Arc::new(MemoryStorage::new())).unwrap();
        assert_eq!(auth.theme(), Theme::Light);
        assert_eq!(auth.toggle_theme().unwrap(), Theme::Dark);
        assert_eq!(auth.theme(), Theme::Dark);
    }
}
