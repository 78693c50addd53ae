//! Matching request paths against versioned call templates

use std::collections::BTreeMap;

use crate::mapping::{ActiveCall, MappingCatalog};

/// An enabled call matched by a request path
#[derive(Debug, Clone)]
pub struct ResolvedCall<'a> {
    pub call: ActiveCall<'a>,
    /// `{name}` segments of the template, by name
    pub path_params: BTreeMap<String, String>,
}

impl<'a> ResolvedCall<'a> {
    pub fn template(&self) -> &'a str {
        self.call.path
    }

    pub fn is_search(&self) -> bool {
        self.call.path.starts_with("/search/")
    }

    /// Polling call of a deferred search, e.g. `/search/germplasm/{searchResultsDbId}`
    pub fn is_search_results(&self) -> bool {
        self.is_search() && !self.path_params.is_empty()
    }
}

fn segments(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|segment| !segment.is_empty())
}

/// Path parameters when `template` matches `path`, with the number of literal
/// segments matched
fn match_template(template: &str, path: &str) -> Option<(BTreeMap<String, String>, usize)> {
    let template: Vec<&str> = segments(template).collect();
    let path: Vec<&str> = segments(path).collect();
    if template.len() != path.len() {
        return None;
    }

    let mut params = BTreeMap::new();
    let mut literals = 0;
    for (expected, actual) in template.iter().zip(&path) {
        match expected.strip_prefix('{').and_then(|s| s.strip_suffix('}')) {
            Some(name) => {
                params.insert(name.to_string(), (*actual).to_string());
            },
            None if expected == actual => literals += 1,
            None => return None,
        }
    }
    Some((params, literals))
}

/// Enabled call of `version` matching `path`; literal segments beat
/// parameters when several templates match
pub fn resolve<'a>(catalog: &'a MappingCatalog, version: &str, path: &str) -> Option<ResolvedCall<'a>> {
    catalog
        .active_calls(version)
        .into_iter()
        .filter_map(|call| {
            match_template(call.path, path).map(|(path_params, literals)| {
                (literals, ResolvedCall { call, path_params })
            })
        })
        .max_by_key(|(literals, _)| *literals)
        .map(|(_, resolved)| resolved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn catalog() -> MappingCatalog {
        let calls = json!({
            "/germplasm": {"dataTypes": ["Germplasm"], "methods": {"GET": {}, "POST": {}}},
            "/germplasm/{germplasmDbId}": {"dataTypes": ["Germplasm"], "methods": {"GET": {}, "PUT": {}}},
            "/germplasm/{germplasmDbId}/mcpd": {"dataTypes": ["Germplasm"], "methods": {"GET": {}}},
            "/search/germplasm": {"dataTypes": ["Germplasm"], "methods": {"POST": {}}},
            "/search/germplasm/{searchResultsDbId}": {"dataTypes": ["Germplasm"], "methods": {"GET": {}}}
        });
        let settings = json!({
            "/germplasm": {"methods": ["GET", "POST"]},
            "/germplasm/{germplasmDbId}": {"methods": ["GET", "PUT"]},
            "/search/germplasm": {"methods": ["POST"], "deferred": true},
            "/search/germplasm/{searchResultsDbId}": {"methods": ["GET"]}
        });
        let doc = json!({
            "schemas": [{"version": "v2", "release": "2.1", "datatypes": {}, "calls": calls}],
            "mappings": [],
            "settings": [{"version": "v2", "release": "2.1", "calls": settings}]
        });
        let active = BTreeMap::from([("v2".to_string(), "2.1".to_string())]);
        MappingCatalog::from_json_str(&doc.to_string(), &active).unwrap()
    }

    #[test]
    fn test_match_template() {
        let (params, literals) = match_template("/germplasm/{germplasmDbId}", "/germplasm/42/").unwrap();
        assert_eq!(params.get("germplasmDbId").map(String::as_str), Some("42"));
        assert_eq!(literals, 1);

        assert!(match_template("/germplasm/{germplasmDbId}", "/germplasm").is_none());
        assert!(match_template("/studies/{studyDbId}", "/germplasm/42").is_none());
    }

    #[test]
    fn test_resolve_enabled_calls() {
        let catalog = catalog();
        let list = resolve(&catalog, "v2", "/germplasm").unwrap();
        assert_eq!(list.template(), "/germplasm");
        assert!(!list.is_search());

        let single = resolve(&catalog, "v2", "/germplasm/7").unwrap();
        assert_eq!(single.path_params["germplasmDbId"], "7");

        let results = resolve(&catalog, "v2", "/search/germplasm/abc").unwrap();
        assert!(results.is_search_results());
        assert!(resolve(&catalog, "v2", "/search/germplasm").unwrap().call.setting.deferred);
    }

    #[test]
    fn test_disabled_and_unknown_calls() {
        let catalog = catalog();
        // Declared by the schema but not enabled
        assert!(resolve(&catalog, "v2", "/germplasm/7/mcpd").is_none());
        assert!(resolve(&catalog, "v2", "/studies").is_none());
        assert!(resolve(&catalog, "v1", "/germplasm").is_none());
    }
}
