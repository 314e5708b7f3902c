// src/core/router/template.rs

//! The command template language of routing rules.
//!
//! An action is a program path followed by argument templates. Arguments
//! that start with `%` are macros:
//!
//! | form                  | expands to                                   |
//! |-----------------------|----------------------------------------------|
//! | `%o %k %t %d %c`      | operation, key id, type, description, callout |
//! | `%u %g`               | requester uid, gid                           |
//! | `%T %P %S`            | thread, process, session keyring             |
//! | `%%text`              | `%text`                                      |
//! | `%{type:description}` | payload of that key in the session keyring   |
//!
//! Parsing is pure. Expansion only touches the key service for `%{...}`.

use super::context::{ContextField, UpcallContext};
use super::rules::RoutingRule;
use crate::core::UpcallError;
use crate::core::keys::KeyService;
use tracing::debug;

/// Most argv entries a command may have, argument zero included.
pub const MAX_ARGV: usize = 254;

/// A macro inside an argument template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Placeholder {
    Field(ContextField),
    /// `%%text`, standing for the literal `%text`.
    Escape(String),
    /// `%{type:description}`
    KeySub {
        key_type: String,
        description: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArgTemplate {
    Literal(String),
    Macro(Placeholder),
}

/// A parsed action, ready to be expanded against a context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandTemplate {
    pub program: String,
    pub args: Vec<ArgTemplate>,
}

fn parse_arg(arg: &str, rule: &RoutingRule) -> Result<ArgTemplate, UpcallError> {
    let Some(body) = arg.strip_prefix('%') else {
        return Ok(ArgTemplate::Literal(arg.to_string()));
    };

    if body.is_empty() {
        return Err(rule.error("Missing macro name"));
    }

    if body.starts_with('%') {
        return Ok(ArgTemplate::Macro(Placeholder::Escape(body.to_string())));
    }

    let mut chars = body.chars();
    if let (Some(c), None) = (chars.next(), chars.next()) {
        return ContextField::from_macro(c)
            .map(|field| ArgTemplate::Macro(Placeholder::Field(field)))
            .ok_or_else(|| rule.error("Unsupported macro"));
    }

    if let Some(inner) = body.strip_prefix('{') {
        let (key_type, rest) = inner
            .split_once(':')
            .ok_or_else(|| rule.error("Keysub macro lacks ':'"))?;
        let (description, trailing) = rest
            .split_once('}')
            .ok_or_else(|| rule.error("Unterminated keysub macro"))?;
        if !trailing.is_empty() {
            return Err(rule.error("Keysub macro has trailing rubbish"));
        }
        if key_type.is_empty() {
            return Err(rule.error("Keysub type empty"));
        }
        if description.is_empty() {
            return Err(rule.error("Keysub description empty"));
        }
        return Ok(ArgTemplate::Macro(Placeholder::KeySub {
            key_type: key_type.to_string(),
            description: description.to_string(),
        }));
    }

    Err(rule.error("Unsupported macro"))
}

/// Printable in the C locale: space through tilde.
fn is_printable(b: u8) -> bool {
    b == b' ' || b.is_ascii_graphic()
}

impl CommandTemplate {
    pub fn parse(rule: &RoutingRule) -> Result<Self, UpcallError> {
        let mut fields = rule.action.split_whitespace();
        let program = fields
            .next()
            .ok_or_else(|| rule.error("No command path"))?
            .to_string();

        let mut args = Vec::new();
        for field in fields {
            if args.len() + 1 >= MAX_ARGV {
                return Err(rule.error("Too many arguments"));
            }
            args.push(parse_arg(field, rule)?);
        }

        Ok(Self { program, args })
    }

    /// Argument zero: the final path segment of the program.
    pub fn arg0(&self) -> &str {
        self.program.rsplit('/').next().unwrap_or(&self.program)
    }

    /// Produces the full argument vector, argument zero included.
    pub fn expand<K: KeyService + ?Sized>(
        &self,
        rule: &RoutingRule,
        ctx: &UpcallContext,
        keys: &K,
    ) -> Result<Vec<String>, UpcallError> {
        let mut argv = Vec::with_capacity(self.args.len() + 1);
        argv.push(self.arg0().to_string());

        for arg in &self.args {
            let value = match arg {
                ArgTemplate::Literal(s) => s.clone(),
                ArgTemplate::Macro(Placeholder::Field(field)) => ctx.field(*field).to_string(),
                ArgTemplate::Macro(Placeholder::Escape(s)) => s.clone(),
                ArgTemplate::Macro(Placeholder::KeySub {
                    key_type,
                    description,
                }) => substitute_key(rule, ctx, keys, key_type, description)?,
            };
            debug!("argv[{}]: '{}'", argv.len(), value);
            argv.push(value);
        }

        Ok(argv)
    }
}

/// Reads a key from the requester's session keyring for use as an argument.
fn substitute_key<K: KeyService + ?Sized>(
    rule: &RoutingRule,
    ctx: &UpcallContext,
    keys: &K,
    key_type: &str,
    description: &str,
) -> Result<String, UpcallError> {
    debug!("Keysub: {} key \"{}\"", key_type, description);

    let session = ctx
        .session_keyring_serial()
        .map_err(|e| rule.error(format!("Keysub needs a session keyring: {e}")))?;
    let found = keys
        .search(session, key_type, description)
        .map_err(|e| rule.error(format!("Keysub key not found: {e}")))?;
    let data = keys
        .read(found)
        .map_err(|e| rule.error(format!("Can't read keysub {found} data: {e}")))?;

    if let Some((index, byte)) = data.iter().enumerate().find(|(_, b)| !is_printable(**b)) {
        return Err(rule.error(format!(
            "keysub {found} data not printable (byte {index} is '{byte:02x}')"
        )));
    }

    // Printable ASCII is always valid UTF-8.
    String::from_utf8(data).map_err(|e| rule.error(e.to_string()))
}
