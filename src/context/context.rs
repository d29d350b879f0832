use crate::ast::Literal;
use crate::catalog::Catalog;
use crate::context::{Modifiers, Notice, Notices, ParamCollector, Timings};

/// The identity on whose behalf the query runs, for access-control
/// injection. `denied_resources` lists the resource kinds on which at least
/// one explicit denial exists for this principal; it is external
/// access-control state fetched by whoever builds the context.
#[derive(Debug, Clone, PartialEq)]
pub struct Principal {
    pub user_id: i64,
    pub is_admin: bool,
    pub denied_resources: Vec<String>,
}

impl Principal {
    pub fn new(user_id: i64) -> Self {
        Self { user_id, is_admin: false, denied_resources: vec![] }
    }

    pub fn admin(user_id: i64) -> Self {
        Self { user_id, is_admin: true, denied_resources: vec![] }
    }

    pub fn with_denials(mut self, resources: Vec<String>) -> Self {
        self.denied_resources = resources;
        self
    }

    pub fn has_denials_on(&self, resource: &str) -> bool {
        self.denied_resources.iter().any(|r| r == resource)
    }
}

/// Per-compilation state: the tenant scope, the schema catalog handle, the
/// parameter table, diagnostics and timings. Constructed once per incoming
/// query and discarded after the SQL string is returned; nothing in here is
/// shared across compilations.
pub struct Context {
    pub team_id: i64,
    pub principal: Option<Principal>,
    pub catalog: Catalog,
    pub modifiers: Modifiers,
    pub params: ParamCollector,
    pub notices: Notices,
    pub timings: Timings,
}

impl Context {
    pub fn new(team_id: i64, catalog: Catalog) -> Self {
        Self {
            team_id,
            principal: None,
            catalog,
            modifiers: Modifiers::default(),
            params: ParamCollector::default(),
            notices: Notices::default(),
            timings: Timings::default(),
        }
    }

    pub fn with_principal(mut self, principal: Principal) -> Self {
        self.principal = Some(principal);
        self
    }

    pub fn with_modifiers(mut self, modifiers: Modifiers) -> Self {
        self.modifiers = modifiers;
        self
    }

    /// Intern a literal and return the placeholder token to embed.
    pub fn add_value(&mut self, value: Literal) -> String {
        self.params.add_value(value)
    }

    /// Intern a secret (credential, URL with embedded auth) under the
    /// redacted namespace.
    pub fn add_sensitive_value(&mut self, value: Literal) -> String {
        self.params.add_sensitive_value(value)
    }

    pub fn add_warning(&mut self, notice: Notice) {
        self.notices.add_warning(notice);
    }

    pub fn add_notice(&mut self, notice: Notice) {
        self.notices.add_notice(notice);
    }
}
