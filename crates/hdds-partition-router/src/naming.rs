// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Entity naming and configuration payloads for routing engine commands.
//!
//! The commander asks a [`CommandBuilder`] for every name and payload it
//! sends. [`TemplateCommandBuilder`] is the stock implementation: entity
//! names and XML payloads are expanded from `{placeholder}` templates.
//!
//! # Placeholders
//!
//! | Placeholder            | Value                                          |
//! |------------------------|------------------------------------------------|
//! | `{service}`            | target routing engine                          |
//! | `{domain_route}`       | domain route hosting the sessions              |
//! | `{topic}`              | topic name                                     |
//! | `{partition}`          | partition (label for `""` inside names)        |
//! | `{session}`            | session resource name                          |
//! | `{route}`              | topic route resource name                      |
//! | `{direction}`          | `IN` / `OUT`                                   |
//! | `{type}`               | registered type name                           |
//! | `{input_participant}`  | participant the route reads from               |
//! | `{output_participant}` | participant the route writes to                |

use crate::config::NamingConfig;
use crate::session::{RouteDirection, Session, TopicRoute};
use thiserror::Error;

/// Separator between entity name segments.
pub const ENTITY_SEPARATOR: &str = "::";

/// Naming errors. These are provider or configuration bugs, never transient.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NamingError {
    #[error("session has an empty topic name")]
    EmptyTopic,

    #[error("invalid entity name '{name}': {reason}")]
    InvalidName { name: String, reason: &'static str },

    #[error("unresolved placeholder '{{{placeholder}}}' in template")]
    UnresolvedPlaceholder { placeholder: String },
}

/// Derives entity names and configuration payloads for routing commands.
pub trait CommandBuilder: Send + Sync {
    /// Entity under which the session is created.
    fn session_parent(&self, session: &Session) -> Result<String, NamingError>;

    /// Session resource name.
    fn session_name(&self, session: &Session) -> Result<String, NamingError>;

    /// Fully qualified session entity, used for deletion.
    fn session_entity_name(&self, session: &Session) -> Result<String, NamingError>;

    /// Session configuration payload.
    fn session_config(&self, session: &Session) -> Result<String, NamingError>;

    /// Entity under which the topic route is created.
    fn route_parent(&self, session: &Session, route: &TopicRoute) -> Result<String, NamingError>;

    /// Topic route resource name.
    fn route_name(&self, session: &Session, route: &TopicRoute) -> Result<String, NamingError>;

    /// Fully qualified topic route entity, used for deletion.
    fn route_entity_name(
        &self,
        session: &Session,
        route: &TopicRoute,
    ) -> Result<String, NamingError>;

    /// Topic route configuration payload.
    fn route_config(&self, session: &Session, route: &TopicRoute) -> Result<String, NamingError>;
}

/// Template-driven [`CommandBuilder`].
#[derive(Debug, Clone)]
pub struct TemplateCommandBuilder {
    service: String,
    config: NamingConfig,
}

impl TemplateCommandBuilder {
    /// Create a builder targeting the routing engine `service`.
    pub fn new(service: impl Into<String>, config: NamingConfig) -> Self {
        Self {
            service: service.into(),
            config,
        }
    }

    fn partition_label<'a>(&'a self, session: &'a Session) -> &'a str {
        if session.is_default_partition() {
            &self.config.default_partition_label
        } else {
            &session.partition
        }
    }

    fn participants(&self, direction: RouteDirection) -> (&str, &str) {
        let observed = self.config.observed_participant.as_str();
        let remote = self.config.remote_participant.as_str();
        match direction {
            RouteDirection::Out => (observed, remote),
            RouteDirection::In => (remote, observed),
        }
    }
}

fn check_session(session: &Session) -> Result<(), NamingError> {
    if session.topic.is_empty() {
        return Err(NamingError::EmptyTopic);
    }
    Ok(())
}

fn check_name(name: String) -> Result<String, NamingError> {
    if name.trim().is_empty() {
        return Err(NamingError::InvalidName {
            name,
            reason: "name is empty",
        });
    }
    if name.contains(ENTITY_SEPARATOR) {
        return Err(NamingError::InvalidName {
            name,
            reason: "name contains the entity separator",
        });
    }
    Ok(name)
}

/// Substitute `{key}` placeholders in a single pass.
///
/// Substituted values are never rescanned. Braces that do not enclose an
/// identifier (`[A-Za-z_]+`) are copied as-is.
fn expand(template: &str, vars: &[(&str, &str)]) -> Result<String, NamingError> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let tail = &rest[open + 1..];
        let key_len = tail
            .find(|c: char| !(c.is_ascii_alphabetic() || c == '_'))
            .unwrap_or(tail.len());

        if key_len == 0 || !tail[key_len..].starts_with('}') {
            out.push('{');
            rest = tail;
            continue;
        }

        let key = &tail[..key_len];
        match vars.iter().find(|(k, _)| *k == key) {
            Some((_, value)) => out.push_str(value),
            None => {
                return Err(NamingError::UnresolvedPlaceholder {
                    placeholder: key.to_string(),
                })
            }
        }
        rest = &tail[key_len + 1..];
    }

    out.push_str(rest);
    Ok(out)
}

/// Escape a value for inclusion in an XML payload.
pub fn xml_escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}

fn qualify(parent: &str, name: &str) -> String {
    format!("{}{}{}", parent, ENTITY_SEPARATOR, name)
}

impl CommandBuilder for TemplateCommandBuilder {
    fn session_parent(&self, session: &Session) -> Result<String, NamingError> {
        check_session(session)?;
        Ok(qualify(&self.service, &self.config.domain_route))
    }

    fn session_name(&self, session: &Session) -> Result<String, NamingError> {
        check_session(session)?;
        let name = expand(
            &self.config.session_name,
            &[
                ("service", self.service.as_str()),
                ("domain_route", self.config.domain_route.as_str()),
                ("topic", session.topic.as_str()),
                ("partition", self.partition_label(session)),
            ],
        )?;
        check_name(name)
    }

    fn session_entity_name(&self, session: &Session) -> Result<String, NamingError> {
        Ok(qualify(
            &self.session_parent(session)?,
            &self.session_name(session)?,
        ))
    }

    fn session_config(&self, session: &Session) -> Result<String, NamingError> {
        let name = xml_escape(&self.session_name(session)?);
        let service = xml_escape(&self.service);
        let domain_route = xml_escape(&self.config.domain_route);
        let topic = xml_escape(&session.topic);
        let partition = xml_escape(&session.partition);
        expand(
            &self.config.session_config,
            &[
                ("service", service.as_str()),
                ("domain_route", domain_route.as_str()),
                ("session", name.as_str()),
                ("topic", topic.as_str()),
                ("partition", partition.as_str()),
            ],
        )
    }

    fn route_parent(&self, session: &Session, _route: &TopicRoute) -> Result<String, NamingError> {
        self.session_entity_name(session)
    }

    fn route_name(&self, session: &Session, route: &TopicRoute) -> Result<String, NamingError> {
        check_session(session)?;
        let name = expand(
            &self.config.route_name,
            &[
                ("service", self.service.as_str()),
                ("topic", route.topic.as_str()),
                ("partition", self.partition_label(session)),
                ("direction", route.direction.as_str()),
                ("type", route.type_name.as_str()),
            ],
        )?;
        check_name(name)
    }

    fn route_entity_name(
        &self,
        session: &Session,
        route: &TopicRoute,
    ) -> Result<String, NamingError> {
        Ok(qualify(
            &self.route_parent(session, route)?,
            &self.route_name(session, route)?,
        ))
    }

    fn route_config(&self, session: &Session, route: &TopicRoute) -> Result<String, NamingError> {
        let name = xml_escape(&self.route_name(session, route)?);
        let session_name = xml_escape(&self.session_name(session)?);
        let service = xml_escape(&self.service);
        let domain_route = xml_escape(&self.config.domain_route);
        let topic = xml_escape(&route.topic);
        let type_name = xml_escape(&route.type_name);
        let partition = xml_escape(&session.partition);
        let (input, output) = self.participants(route.direction);
        let (input, output) = (xml_escape(input), xml_escape(output));
        expand(
            &self.config.route_config,
            &[
                ("service", service.as_str()),
                ("domain_route", domain_route.as_str()),
                ("session", session_name.as_str()),
                ("route", name.as_str()),
                ("topic", topic.as_str()),
                ("type", type_name.as_str()),
                ("partition", partition.as_str()),
                ("direction", route.direction.as_str()),
                ("input_participant", input.as_str()),
                ("output_participant", output.as_str()),
            ],
        )
    }
}
