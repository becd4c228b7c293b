/********************************************************************************
 * Copyright (c) 2026 Contributors to the Eclipse Foundation
 *
 * See the NOTICE file(s) distributed with this work for additional
 * information regarding copyright ownership.
 *
 * This program and the accompanying materials are made available under the
 * terms of the Apache License Version 2.0 which is available at
 * https://www.apache.org/licenses/LICENSE-2.0
 *
 * SPDX-License-Identifier: Apache-2.0
 ********************************************************************************/

//! `{name}` placeholder substitution for command templates.
//!
//! Values are inserted verbatim unless the placeholder names an escape:
//! `{name:sh}` quotes the value as one shell word and `{name:sed}` makes it
//! safe as the replacement of a single-quoted `s/…/…/` sed script.

use crate::process::shell_escape;

/// Substitutes every `{key}` occurrence with its value.
///
/// Placeholders without a binding, or with an unknown escape, are left
/// untouched so a template can pass literal braces through to the remote shell.
pub fn render(template: &str, bindings: &[(&str, &str)]) -> String {
    let mut rendered = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        rendered.push_str(&rest[..open]);
        let after_open = &rest[open + 1..];
        let Some(close) = after_open.find('}') else {
            rendered.push_str(&rest[open..]);
            return rendered;
        };

        let key = &after_open[..close];
        let (name, escape) = match key.split_once(':') {
            Some((name, escape)) => (name, Some(escape)),
            None => (key, None),
        };
        let substituted = bindings
            .iter()
            .find(|(bound, _)| *bound == name)
            .and_then(|(_, value)| escape_value(value, escape));
        match substituted {
            Some(value) => rendered.push_str(&value),
            None => {
                rendered.push('{');
                rendered.push_str(key);
                rendered.push('}');
            }
        }
        rest = &after_open[close + 1..];
    }

    rendered.push_str(rest);
    rendered
}

fn escape_value(value: &str, escape: Option<&str>) -> Option<String> {
    match escape {
        None => Some(value.to_string()),
        Some("sh") => Some(shell_escape(value)),
        Some("sed") => Some(sed_replacement(value)),
        Some(_) => None,
    }
}

fn sed_replacement(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '\\' | '/' | '&' => {
                escaped.push('\\');
                escaped.push(ch);
            }
            '\n' => escaped.push_str("\\n"),
            // Closes the single-quoted script, emits a quote, reopens it.
            '\'' => escaped.push_str("'\\''"),
            _ => escaped.push(ch),
        }
    }
    escaped
}

/// Owned placeholder values, extended per invocation.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Bindings {
    values: Vec<(&'static str, String)>,
}

impl Bindings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces the value for `name`.
    pub fn with(mut self, name: &'static str, value: impl Into<String>) -> Self {
        let value = value.into();
        match self.values.iter_mut().find(|(key, _)| *key == name) {
            Some(slot) => slot.1 = value,
            None => self.values.push((name, value)),
        }
        self
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.values
            .iter()
            .find(|(key, _)| *key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn render(&self, template: &str) -> String {
        let borrowed: Vec<(&str, &str)> = self
            .values
            .iter()
            .map(|(key, value)| (*key, value.as_str()))
            .collect();
        render(template, &borrowed)
    }
}
