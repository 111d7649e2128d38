//! Query-string state shared by every table on a page, and the reconciler
//! that merges one filter form's fields into it.

use crate::error::ConfigError;
use crate::form::{FieldValue, FormSnapshot};
use std::collections::HashMap;
use std::fmt::{Display, Formatter, Result as FmtResult};
use url::Url;
use url::form_urlencoded::{Serializer, parse as parse_urlencoded};

/// Ordered key/value pairs of a query string. Keys may repeat.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Query {
    pairs: Vec<(String, String)>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a raw query string; a leading `?` is ignored.
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.strip_prefix('?').unwrap_or(raw);
        Self {
            pairs: parse_urlencoded(trimmed.as_bytes()).into_owned().collect(),
        }
    }

    pub fn from_url(url: &Url) -> Self {
        Self {
            pairs: url.query_pairs().into_owned().collect(),
        }
    }

    /// Query carried by a link target.
    ///
    /// Absolute URLs contribute their query component; anything else is read
    /// as a bare query string, the way `URLSearchParams(href)` would.
    pub fn from_href(href: &str) -> Self {
        Url::parse(href).map_or_else(|_| Self::parse(href), |url| Self::from_url(&url))
    }

    pub fn pairs(&self) -> &[(String, String)] {
        &self.pairs
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(name, _)| name == key)
            .map(|(_, value)| value.as_str())
    }

    pub fn get_all(&self, key: &str) -> Vec<&str> {
        self.pairs
            .iter()
            .filter(|(name, _)| name == key)
            .map(|(_, value)| value.as_str())
            .collect()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.pairs.iter().any(|(name, _)| name == key)
    }

    pub fn append(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.pairs.push((key.into(), value.into()));
    }

    /// Remove every pair with this key.
    pub fn remove(&mut self, key: &str) {
        self.pairs.retain(|(name, _)| name != key);
    }

    /// `application/x-www-form-urlencoded` serialization without the leading `?`.
    pub fn serialize(&self) -> String {
        let mut serializer = Serializer::new(String::new());
        serializer.extend_pairs(self.pairs.iter());
        serializer.finish()
    }
}

impl Display for Query {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(&self.serialize())
    }
}

impl FromIterator<(String, String)> for Query {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self {
            pairs: iter.into_iter().collect(),
        }
    }
}

/// Merge a filter form's current values into the address-bar query.
///
/// Keys declared by the form are dropped first, so clearing a field removes
/// its key; keys owned by other forms on the page are left alone. Empty and
/// file values are never serialized. The form's page key is removed so the
/// filtered result starts at the first page.
pub fn compute_next_query(
    current: &Query,
    declared_fields: &[String],
    snapshot: &FormSnapshot,
    page_key: Option<&str>,
) -> Query {
    let mut next: Query = current
        .pairs()
        .iter()
        .filter(|(key, _)| !declared_fields.iter().any(|field| field == key))
        .cloned()
        .collect();

    for (name, value) in snapshot.entries() {
        match value {
            FieldValue::Text(text) if !text.is_empty() => next.append(name.clone(), text.clone()),
            FieldValue::Text(_) | FieldValue::File(_) => {}
        }
    }

    if let Some(key) = page_key {
        next.remove(key);
    }
    next
}

/// Reject pages where two filter forms declare the same field name.
///
/// Query-string key ownership is decided purely by name, so an overlap would
/// let one form silently clobber the other's filter.
///
/// # Errors
/// Returns [`ConfigError::OverlappingFieldNames`] for the first shared name found.
pub fn check_field_ownership<'form, I>(forms: I) -> Result<(), ConfigError>
where
    I: IntoIterator<Item = (&'form str, &'form [String])>,
{
    let mut owners: HashMap<&str, &str> = HashMap::new();
    for (form_label, fields) in forms {
        let mut seen_in_form: Vec<&str> = Vec::new();
        for field in fields {
            if seen_in_form.contains(&field.as_str()) {
                // Radio groups and multi-selects repeat a name within one form.
                continue;
            }
            seen_in_form.push(field.as_str());
            if let Some(owner) = owners.insert(field.as_str(), form_label) {
                return Err(ConfigError::OverlappingFieldNames {
                    field: field.clone(),
                    first_form: owner.to_owned(),
                    second_form: form_label.to_owned(),
                });
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{Query, check_field_ownership, compute_next_query};
    use crate::error::ConfigError;
    use crate::form::{FieldValue, FormSnapshot};

    fn fields(names: &[&str]) -> Vec<String> {
        names.iter().map(|name| (*name).to_owned()).collect()
    }

    #[test]
    fn filter_submission_replaces_own_keys_and_resets_page() {
        let current = Query::parse("?status=active&page=3&q=foo");
        let snapshot = FormSnapshot::from_entries(vec![
            (String::from("status"), FieldValue::Text(String::new())),
            (String::from("q"), FieldValue::Text(String::from("bar"))),
        ]);

        let next = compute_next_query(&current, &fields(&["status", "q"]), &snapshot, Some("page"));

        assert_eq!(next.serialize(), "q=bar");
    }

    #[test]
    fn keys_of_other_forms_survive() {
        let current = Query::parse("other_table_q=x&q=old&other_page=2");
        let snapshot = FormSnapshot::from_entries(vec![(
            String::from("q"),
            FieldValue::Text(String::from("new")),
        )]);

        let next = compute_next_query(&current, &fields(&["q"]), &snapshot, Some("page"));

        assert_eq!(next.get("other_table_q"), Some("x"));
        assert_eq!(next.get("other_page"), Some("2"));
        assert_eq!(next.get_all("q"), vec!["new"]);
    }

    #[test]
    fn multi_valued_fields_keep_every_value_and_skip_files() {
        let snapshot = FormSnapshot::from_entries(vec![
            (String::from("tag"), FieldValue::Text(String::from("a"))),
            (String::from("tag"), FieldValue::Text(String::from("b"))),
            (String::from("upload"), FieldValue::File(String::from("report.csv"))),
        ]);

        let next = compute_next_query(
            &Query::parse("tag=z"),
            &fields(&["tag", "upload"]),
            &snapshot,
            None,
        );

        assert_eq!(next.get_all("tag"), vec!["a", "b"]);
        assert!(!next.contains_key("upload"));
    }

    #[test]
    fn href_queries_accept_absolute_and_relative_forms() {
        assert_eq!(Query::from_href("?page=2&sort=name").get("page"), Some("2"));
        assert_eq!(
            Query::from_href("https://example.com/items/?page=4").get("page"),
            Some("4")
        );
    }

    #[test]
    fn overlapping_field_names_are_rejected() {
        let first = fields(&["q", "status", "status"]);
        let second = fields(&["name", "status"]);
        let result = check_field_ownership([("t1", first.as_slice()), ("t2", second.as_slice())]);
        assert_eq!(
            result,
            Err(ConfigError::OverlappingFieldNames {
                field: String::from("status"),
                first_form: String::from("t1"),
                second_form: String::from("t2"),
            })
        );

        let disjoint = fields(&["other"]);
        assert_eq!(
            check_field_ownership([("t1", first.as_slice()), ("t3", disjoint.as_slice())]),
            Ok(())
        );
    }
}
