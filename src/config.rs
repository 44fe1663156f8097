//! Process-wide configuration for the notifier.

use chrono::TimeDelta;

use crate::job::RetryPolicy;

/// Configuration for a [`crate::Notifier`] instance.
///
/// Constructed once per process (or per request in multi-tenant deployments)
/// and passed into [`crate::Notifier::builder`]. All values have workable
/// defaults except the admin address, which must be set for admin-addressed
/// notifications and the recipient fallback to resolve.
#[derive(Debug, Clone)]
pub struct Config {
    /// When enabled (the default) every trigger goes through the scheduler,
    /// even with a zero delay. Disabling sends zero-delay triggers
    /// synchronously in the calling context.
    pub async_enabled: bool,
    pub site_name: String,
    pub login_url: String,
    pub admin_name: String,
    pub admin_email: String,
    /// The `From` header applied to every outbound message.
    pub sender: String,
    pub retry: RetryPolicy,
    /// How long an activated quarantine suppresses retries.
    pub quarantine_ttl: TimeDelta,
    /// Upper bound on the durable unsent queue. The oldest records are
    /// dropped once the cap is exceeded.
    pub unsent_cap: usize,
    /// The current tenant, supplied by the caller.
    pub tenant: Option<String>,
    /// Key the quarantine flag and unsent queue by tenant instead of
    /// globally. Off by default: transport credentials are typically shared
    /// across tenants, so an authentication failure is a platform-wide
    /// condition.
    pub tenant_scoped_quarantine: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            async_enabled: true,
            site_name: String::new(),
            login_url: String::new(),
            admin_name: String::new(),
            admin_email: String::new(),
            sender: String::new(),
            retry: RetryPolicy::default(),
            quarantine_ttl: TimeDelta::hours(1),
            unsent_cap: 1000,
            tenant: None,
            tenant_scoped_quarantine: false,
        }
    }
}

impl Config {
    pub fn new(site_name: impl Into<String>, admin_email: impl Into<String>) -> Self {
        let admin_email = admin_email.into();
        Self {
            site_name: site_name.into(),
            sender: admin_email.clone(),
            admin_email,
            ..Default::default()
        }
    }

    pub fn with_async_enabled(mut self, async_enabled: bool) -> Self {
        self.async_enabled = async_enabled;
        self
    }

    pub fn with_login_url(mut self, login_url: impl Into<String>) -> Self {
        self.login_url = login_url.into();
        self
    }

    pub fn with_admin_name(mut self, admin_name: impl Into<String>) -> Self {
        self.admin_name = admin_name.into();
        self
    }

    pub fn with_sender(mut self, sender: impl Into<String>) -> Self {
        self.sender = sender.into();
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_quarantine_ttl(mut self, ttl: TimeDelta) -> Self {
        self.quarantine_ttl = ttl;
        self
    }

    pub fn with_unsent_cap(mut self, cap: usize) -> Self {
        self.unsent_cap = cap;
        self
    }

    pub fn with_tenant(mut self, tenant: impl Into<String>) -> Self {
        self.tenant = Some(tenant.into());
        self
    }

    pub fn with_tenant_scoped_quarantine(mut self, scoped: bool) -> Self {
        self.tenant_scoped_quarantine = scoped;
        self
    }
}
