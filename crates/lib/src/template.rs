//! Template binder: validate supplied parameters against a prompt's declarations and substitute
//! `${NAME}` placeholders in a single pass.
//!
//! `$${` is an escape for a literal `${`. Supplied values are copied verbatim and never rescanned,
//! so a value containing `${OTHER}` stays as typed.

use std::collections::BTreeMap;

use crate::error::{BindingError, LoadError};
use crate::primitives::PromptTemplate;

/// One piece of a template body.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment<'a> {
    Text(&'a str),
    Placeholder(&'a str),
}

/// Split a body into literal text and placeholder names. `$${` yields a literal `${`.
fn segments(body: &str) -> Result<Vec<Segment<'_>>, usize> {
    let mut out = Vec::new();
    let mut rest = body;
    let mut offset = 0;
    while let Some(pos) = rest.find("${") {
        if pos > 0 && rest.as_bytes()[pos - 1] == b'$' {
            // "$${" -> literal "${"
            out.push(Segment::Text(&rest[..pos - 1]));
            out.push(Segment::Text("${"));
            rest = &rest[pos + 2..];
            offset += pos + 2;
            continue;
        }
        if pos > 0 {
            out.push(Segment::Text(&rest[..pos]));
        }
        let after = &rest[pos + 2..];
        let end = after.find('}').ok_or(offset + pos)?;
        out.push(Segment::Placeholder(after[..end].trim()));
        rest = &after[end + 1..];
        offset += pos + 2 + end + 1;
    }
    if !rest.is_empty() {
        out.push(Segment::Text(rest));
    }
    Ok(out)
}

/// Load-time checks for a prompt template. Returns every problem found.
pub fn validate(template: &PromptTemplate) -> Vec<LoadError> {
    let mut errors = Vec::new();
    match segments(&template.body) {
        Ok(segs) => {
            let mut seen: Vec<&str> = Vec::new();
            for s in segs {
                let Segment::Placeholder(name) = s else { continue };
                if !template.parameters.contains_key(name) && !seen.contains(&name) {
                    errors.push(LoadError::UndeclaredPlaceholder {
                        template: template.name.clone(),
                        placeholder: name.to_string(),
                    });
                }
                seen.push(name);
            }
        }
        Err(offset) => errors.push(LoadError::UnterminatedPlaceholder {
            template: template.name.clone(),
            offset,
        }),
    }
    for (name, decl) in &template.parameters {
        let Some(allowed) = &decl.allowed_values else { continue };
        if allowed.is_empty() {
            errors.push(LoadError::EmptyAllowedValues {
                template: template.name.clone(),
                parameter: name.clone(),
            });
            continue;
        }
        if let Some(default) = &decl.default {
            if !decl.accepts(default) {
                errors.push(LoadError::DefaultNotAllowed {
                    template: template.name.clone(),
                    parameter: name.clone(),
                    default: default.clone(),
                    allowed: allowed.clone(),
                });
            }
        }
    }
    errors
}

/// Resolve every declared parameter to its effective value.
///
/// Unknown supplied names are reported first (in name order), then declared parameters in name
/// order, so the same input always yields the same error.
pub fn resolve_values(
    template: &PromptTemplate,
    supplied: &BTreeMap<String, String>,
) -> Result<BTreeMap<String, String>, BindingError> {
    if let Some(unknown) = supplied
        .keys()
        .find(|k| !template.parameters.contains_key(*k))
    {
        return Err(BindingError::UnknownParameter {
            template: template.name.clone(),
            parameter: unknown.clone(),
        });
    }

    let mut values = BTreeMap::new();
    for (name, decl) in &template.parameters {
        let value = match supplied.get(name) {
            Some(v) => {
                if !decl.accepts(v) {
                    return Err(BindingError::InvalidParameterValue {
                        template: template.name.clone(),
                        parameter: name.clone(),
                        value: v.clone(),
                        allowed: decl.allowed_values.clone().unwrap_or_default(),
                    });
                }
                v.clone()
            }
            None if decl.required => {
                return Err(BindingError::MissingRequiredParameter {
                    template: template.name.clone(),
                    parameter: name.clone(),
                });
            }
            None => decl.default.clone().unwrap_or_default(),
        };
        values.insert(name.clone(), value);
    }
    Ok(values)
}

/// Bind `supplied` parameters into the template body.
pub fn bind(
    template: &PromptTemplate,
    supplied: &BTreeMap<String, String>,
) -> Result<String, BindingError> {
    let values = resolve_values(template, supplied)?;
    // Bodies are validated at registry load; an unterminated placeholder here means the template
    // bypassed the registry, so the remainder is emitted as text.
    let segs = segments(&template.body).unwrap_or_else(|_| vec![Segment::Text(&template.body)]);
    let mut out = String::with_capacity(template.body.len());
    for s in segs {
        match s {
            Segment::Text(t) => out.push_str(t),
            Segment::Placeholder(name) => {
                if let Some(v) = values.get(name) {
                    out.push_str(v);
                }
            }
        }
    }
    log::debug!(
        "bound prompt {} with {} parameter(s)",
        template.name,
        values.len()
    );
    Ok(out)
}
