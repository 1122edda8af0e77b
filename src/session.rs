//! Per-client login context.
//!
//! Holds who is logged in and since when. Callers own the value and pass it
//! to whatever needs an access decision.

use chrono::{DateTime, Utc};

use crate::models::{Role, User};

/// Areas of the application that may be gated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Page {
    Home,
    Knowledge,
    /// Lot sizing tab of the money-management page
    SizingOnly,
    MoneyManagement,
    GridPlanner,
    Portfolio,
    Users,
}

impl Page {
    /// Pages anyone may open without logging in.
    pub fn is_public(&self) -> bool {
        matches!(self, Page::Home | Page::Knowledge | Page::SizingOnly)
    }

    /// Pages restricted to administrators.
    pub fn is_admin_only(&self) -> bool {
        matches!(self, Page::Users)
    }
}

#[derive(Debug, Clone, Default)]
pub struct Session {
    user: Option<User>,
    logged_in_at: Option<DateTime<Utc>>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn login(&mut self, user: User) {
        self.login_at(user, Utc::now());
    }

    pub fn login_at(&mut self, user: User, at: DateTime<Utc>) {
        self.user = Some(user);
        self.logged_in_at = Some(at);
    }

    pub fn logout(&mut self) {
        self.user = None;
        self.logged_in_at = None;
    }

    pub fn is_logged_in(&self) -> bool {
        self.user.is_some()
    }

    pub fn current_user(&self) -> Option<&User> {
        self.user.as_ref()
    }

    pub fn logged_in_at(&self) -> Option<DateTime<Utc>> {
        self.logged_in_at
    }

    /// True when logged in with any of `roles`.
    pub fn has_role(&self, roles: &[Role]) -> bool {
        self.user.as_ref().map_or(false, |u| roles.contains(&u.role))
    }

    pub fn can_access(&self, page: Page) -> bool {
        if page.is_public() {
            return true;
        }
        if page.is_admin_only() {
            return self.has_role(&[Role::Admin]);
        }
        self.is_logged_in()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(role: Role) -> User {
        User {
            id: 1,
            username: "tester".to_string(),
            role,
            created_at: Utc::now(),
            expiry_at: None,
        }
    }

    #[test]
    fn test_anonymous_sees_public_pages_only() {
        let session = Session::new();
        assert!(session.can_access(Page::Home));
        assert!(session.can_access(Page::Knowledge));
        assert!(session.can_access(Page::SizingOnly));
        assert!(!session.can_access(Page::GridPlanner));
        assert!(!session.can_access(Page::Users));
        assert!(!session.has_role(&[Role::User, Role::Admin]));
    }

    #[test]
    fn test_user_and_admin_access() {
        let mut session = Session::new();
        session.login(user(Role::User));
        assert!(session.can_access(Page::Portfolio));
        assert!(!session.can_access(Page::Users));
        assert!(session.logged_in_at().is_some());

        session.login(user(Role::Admin));
        assert!(session.can_access(Page::Users));
        assert!(session.has_role(&[Role::Admin]));

        session.logout();
        assert!(!session.is_logged_in());
        assert!(session.current_user().is_none());
        assert!(!session.can_access(Page::MoneyManagement));
    }
}
