// src/core/router/mod.rs

//! The action router: picks the routing rule for an upcall and turns it
//! into the command that will service the key.
//!
//! The pipeline is `match → parse → expand → exec`. Everything before the
//! exec is side-effect free apart from secondary key lookups, so the whole
//! decision can be inspected without replacing the process.

pub mod context;
pub mod exec;
pub mod glob;
pub mod rules;
pub mod template;

pub use context::{ContextField, UpcallContext};
pub use exec::ExecPlan;
pub use glob::{Glob, PatternError, glob_match};
pub use rules::{RoutingRule, RuleFile};
pub use template::{ArgTemplate, CommandTemplate, Placeholder};

use crate::core::UpcallError;
use crate::core::keys::KeyService;

/// Routes upcalls using one routing file and one key service.
pub struct ActionRouter<'a, K: KeyService + ?Sized> {
    rules: &'a RuleFile,
    keys: &'a K,
}

impl<'a, K: KeyService + ?Sized> ActionRouter<'a, K> {
    pub fn new(rules: &'a RuleFile, keys: &'a K) -> Self {
        Self { rules, keys }
    }

    /// Resolves the command for `ctx` without executing it.
    pub fn route(&self, ctx: &UpcallContext) -> Result<ExecPlan, UpcallError> {
        let rule = self.rules.lookup(ctx.match_fields())?;
        let template = CommandTemplate::parse(&rule)?;
        let argv = template.expand(&rule, ctx, self.keys)?;
        Ok(ExecPlan {
            program: template.program,
            argv,
            rule,
        })
    }
}
