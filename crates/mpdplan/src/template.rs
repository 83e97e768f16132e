// References:
// 1. https://dashif.org/docs/DASH-IF-IOP-v4.3.pdf
// 2. https://github.com/emarsden/dash-mpd-rs/blob/6ebdfb4759adbda8233b5b3520804e23ff86e7de/src/fetch.rs#L435-L466

use regex::Regex;
use std::sync::LazyLock;

use crate::{MpdError, MpdResult};

// Matches `$...$`, including the empty `$$` escape.
//
// Example template: "$RepresentationID$/$Number%06d$.m4s"
static TEMPLATE_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\$([^$]*)\$").unwrap());

// From https://dashif.org/docs/DASH-IF-IOP-v4.3.pdf:
// "For the avoidance of doubt, only %0[width]d is permitted and no other identifiers."
static FORMAT_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^0(\d+)d$").unwrap());

/// Values available to a template.
#[derive(Debug, Clone, Default)]
pub struct TemplateContext {
    pub number: Option<u64>,
    pub representation_id: Option<String>,
}

impl TemplateContext {
    pub const NUMBER: &'static str = "Number";
    pub const REPRESENTATION_ID: &'static str = "RepresentationID";

    pub fn new() -> Self {
        Self::default()
    }

    pub fn number(mut self, number: u64) -> Self {
        self.number = Some(number);
        self
    }

    pub fn representation_id(mut self, id: impl Into<String>) -> Self {
        self.representation_id = Some(id.into());
        self
    }

    fn get(&self, identifier: &str) -> MpdResult<String> {
        let value = match identifier {
            Self::NUMBER => self.number.map(|n| n.to_string()),
            Self::REPRESENTATION_ID => self.representation_id.clone(),
            _ => {
                return Err(MpdError::Template(format!(
                    "unsupported placeholder ${identifier}$"
                )))
            }
        };
        value.ok_or_else(|| MpdError::Template(format!("no value for ${identifier}$")))
    }
}

/// Substitutes every placeholder of `pattern`.
pub fn expand(pattern: &str, context: &TemplateContext) -> MpdResult<String> {
    let mut result = String::with_capacity(pattern.len());
    let mut last = 0;

    for caps in TEMPLATE_REGEX.captures_iter(pattern) {
        let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        result.push_str(&pattern[last..whole.start()]);
        last = whole.end();

        let name = name.as_str();
        if name.is_empty() {
            result.push('$');
            continue;
        }

        let (identifier, format) = match name.split_once('%') {
            Some((identifier, format)) => (identifier, Some(format)),
            None => (name, None),
        };
        let value = context.get(identifier)?;
        match format {
            Some(format) => {
                let width = FORMAT_REGEX
                    .captures(format)
                    .and_then(|caps| caps.get(1))
                    .and_then(|width| width.as_str().parse::<usize>().ok())
                    .ok_or_else(|| {
                        MpdError::Template(format!("invalid format tag in ${name}$"))
                    })?;
                result.push_str(&format!("{value:0>width$}"));
            }
            None => result.push_str(&value),
        }
    }

    let rest = &pattern[last..];
    if rest.contains('$') {
        return Err(MpdError::Template(format!(
            "unterminated placeholder in {pattern:?}"
        )));
    }
    result.push_str(rest);

    Ok(result)
}

/// Expands a media template for `count` consecutive segment numbers starting at `start_number`.
pub fn expand_media(
    pattern: &str,
    context: &TemplateContext,
    start_number: u64,
    count: usize,
) -> MpdResult<Vec<String>> {
    (0..count as u64)
        .map(|index| expand(pattern, &context.clone().number(start_number + index)))
        .collect()
}
