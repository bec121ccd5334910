// src/core/template.rs

use crate::models::Project;
use lazy_static::lazy_static;
use regex::{Captures, Regex};

lazy_static! {
    static ref PLACEHOLDER_RE: Regex = Regex::new(r"\{\{([^{}]+)\}\}")
        .unwrap_or_else(|_| unreachable!("static placeholder pattern"));
}

/// Placeholder names filled from the project itself. Variables may not use them.
pub const RESERVED_NAMES: [&str; 2] = ["port", "domain"];

/// Expands `{{port}}`, `{{domain}}` and `{{<variable>}}` in a command template.
///
/// Substitution is a single pass: a value that itself contains `{{...}}` is
/// inserted verbatim. Unknown placeholders are left untouched so a typo is
/// visible in the launched command line.
pub fn expand(template: &str, project: &Project) -> String {
    PLACEHOLDER_RE
        .replace_all(template, |caps: &Captures<'_>| {
            let whole = caps.get(0).map_or("", |m| m.as_str());
            let key = caps.get(1).map_or("", |m| m.as_str());
            lookup(key, project).unwrap_or_else(|| {
                log::debug!("Unknown placeholder '{}' in '{}'", whole, template);
                whole.to_string()
            })
        })
        .into_owned()
}

fn lookup(key: &str, project: &Project) -> Option<String> {
    match key {
        "port" => Some(project.port.to_string()),
        "domain" => Some(project.domain.clone()),
        _ => project.variable(key).map(|v| v.value.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Variable;

    fn project() -> Project {
        Project {
            id: 1,
            name: "app".into(),
            domain: "app.test".into(),
            port: 8080,
            dir: None,
            commands: vec![],
            variables: vec![
                Variable {
                    id: 1,
                    name: "foo".into(),
                    value: "bar".into(),
                    project_id: 1,
                },
                Variable {
                    id: 2,
                    name: "nested".into(),
                    value: "{{port}}".into(),
                    project_id: 1,
                },
            ],
            domain_aliases: vec![],
        }
    }

    #[test]
    fn test_expands_port_domain_and_variables() {
        assert_eq!(
            expand("run --port {{port}} --host {{domain}} --k {{foo}}", &project()),
            "run --port 8080 --host app.test --k bar"
        );
    }

    #[test]
    fn test_repeated_placeholders() {
        assert_eq!(expand("{{port}}:{{port}}", &project()), "8080:8080");
    }

    #[test]
    fn test_unknown_placeholders_are_kept() {
        assert_eq!(
            expand("echo {{missing}} {{ port }}", &project()),
            "echo {{missing}} {{ port }}"
        );
    }

    #[test]
    fn test_values_are_not_expanded_again() {
        assert_eq!(expand("x={{nested}}", &project()), "x={{port}}");
    }

    #[test]
    fn test_plain_text_passes_through() {
        assert_eq!(expand("npm run dev", &project()), "npm run dev");
    }
}
