//! C1: xpath parsing into the structured [`Path`] representation gNMI
//! expects.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::XpathError;
use crate::model::{Path, PathElem};

/// `name` followed by zero or more bracketed `[key=value]` fragments.
static RE_COMPONENT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?P<name>[^\[]+)(?P<brackets>(\[[^\[\]=]+=[^\[\]]*\])*)$").unwrap()
});

/// Pulls every individual `[k=v]` fragment out of a component's bracket
/// tail so all keys on one element are collected into a single keymap,
/// not just the last one.
static RE_BRACKET: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[([^\[\]=]+)=([^\[\]]*)\]").unwrap());

/// Splits an xpath body on `/` while respecting bracket depth: a `/`
/// appearing inside `[...]` does not split.
fn split_respecting_brackets(body: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut start = 0usize;
    for (i, c) in body.char_indices() {
        match c {
            '[' => depth += 1,
            ']' => depth -= 1,
            '/' if depth == 0 => {
                parts.push(&body[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&body[start..]);
    parts
}

/// Parses a slash-separated xpath into a [`Path`]. Strips one leading and
/// one trailing `/`, splits on `/` at bracket depth zero, then matches each
/// component against the path-component grammar. A component may carry
/// multiple bracketed key/value fragments; all of them are merged into one
/// keymap for that element.
///
/// Empty input or a bare `/` fails with [`XpathError::Empty`]; any
/// component that does not match the grammar fails with
/// [`XpathError::MalformedComponent`].
pub fn xpath_to_gnmi(
    xpath: &str,
    origin: &str,
    target: Option<&str>,
) -> Result<Path, XpathError> {
    if xpath.is_empty() || xpath == "/" {
        return Err(XpathError::Empty);
    }

    let mut body = xpath;
    if let Some(rest) = body.strip_prefix('/') {
        body = rest;
    }
    if let Some(rest) = body.strip_suffix('/') {
        body = rest;
    }

    if body.is_empty() {
        return Err(XpathError::Empty);
    }

    let mut elements = Vec::new();
    for component in split_respecting_brackets(body) {
        let caps = RE_COMPONENT
            .captures(component)
            .ok_or_else(|| XpathError::MalformedComponent(component.to_string()))?;
        let name = caps.name("name").unwrap().as_str().to_string();
        let brackets = caps.name("brackets").map(|m| m.as_str()).unwrap_or("");
        let mut keys: HashMap<String, String> = HashMap::new();
        for kv in RE_BRACKET.captures_iter(brackets) {
            keys.insert(kv[1].to_string(), kv[2].to_string());
        }
        elements.push(PathElem { name, keys });
    }

    Ok(Path {
        elements,
        origin: origin.to_string(),
        target: target.map(str::to_string),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_simple_path() {
        let p = xpath_to_gnmi(
            "/interfaces/interface[name=eth0]/state/counters",
            "openconfig",
            None,
        )
        .unwrap();
        assert_eq!(p.elements.len(), 4);
        assert_eq!(p.elements[0].name, "interfaces");
        assert!(p.elements[0].keys.is_empty());
        assert_eq!(p.elements[1].name, "interface");
        assert_eq!(p.elements[1].keys.get("name"), Some(&"eth0".to_string()));
        assert_eq!(p.elements[2].name, "state");
        assert_eq!(p.elements[3].name, "counters");
        assert_eq!(p.origin, "openconfig");
    }

    #[test]
    fn empty_xpath_errors() {
        assert_eq!(xpath_to_gnmi("", "openconfig", None), Err(XpathError::Empty));
    }

    #[test]
    fn bare_slash_errors() {
        assert_eq!(xpath_to_gnmi("/", "openconfig", None), Err(XpathError::Empty));
    }

    #[test]
    fn element_count_matches_slash_separated_components() {
        let x = "/a/b[k=v]/c";
        let p = xpath_to_gnmi(x, "openconfig", None).unwrap();
        assert_eq!(p.elements.len(), 3);
    }

    #[test]
    fn bracket_containing_slash_does_not_split() {
        let p = xpath_to_gnmi("/a/b[k=v/w]/c", "openconfig", None).unwrap();
        assert_eq!(p.elements.len(), 3);
        assert_eq!(p.elements[1].keys.get("k"), Some(&"v/w".to_string()));
    }

    #[test]
    fn multiple_brackets_merge_into_one_keymap() {
        let p = xpath_to_gnmi("/a/b[k1=v1][k2=v2]", "openconfig", None).unwrap();
        assert_eq!(p.elements[1].keys.len(), 2);
        assert_eq!(p.elements[1].keys.get("k1"), Some(&"v1".to_string()));
        assert_eq!(p.elements[1].keys.get("k2"), Some(&"v2".to_string()));
    }

    #[test]
    fn round_trips_element_names_and_keys() {
        let x = "/a/b[k=v]/c";
        let p = xpath_to_gnmi(x, "openconfig", None).unwrap();
        let rebuilt: Vec<String> = p
            .elements
            .iter()
            .map(|e| {
                if e.keys.is_empty() {
                    e.name.clone()
                } else {
                    let kv: Vec<String> =
                        e.keys.iter().map(|(k, v)| format!("[{k}={v}]")).collect();
                    format!("{}{}", e.name, kv.concat())
                }
            })
            .collect();
        assert_eq!(format!("/{}", rebuilt.join("/")), x);
    }
}
