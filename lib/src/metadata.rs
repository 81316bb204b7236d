use std::fmt;
use std::borrow::Borrow;
use std::collections::BTreeMap;

use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;

use crate::error::Result;

pub type Dict = serde_json::Map<String, Value>;

/// A statically typed metadata key.
pub trait MetaKey: 'static {
    const KEY: &'static str;

    type Value: Serialize + DeserializeOwned + fmt::Debug;
}

#[macro_export]
macro_rules! define_meta_key {
    ($($v:vis $T:ident : $key:literal => $V:ty),+ $(,)?) => {
        $(
            $v struct $T;

            impl $crate::metadata::MetaKey for $T {
                const KEY: &'static str = $key;
                type Value = $V;
            }
        )+
    }
}

define_meta_key! {
    pub Layout : "layout" => String,
    pub Date : "date" => String,
}

/// A page's or layout's metadata: string keys to JSON-like values.
///
/// Front matter only ever produces strings, but scope generators may merge in
/// arbitrary values, so the map is not restricted to strings.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Metadata {
    map: BTreeMap<String, Value>,
}

impl Metadata {
    #[inline(always)]
    pub fn new() -> Self {
        Metadata::default()
    }

    #[inline(always)]
    pub fn get_raw(&self, key: &str) -> Option<&Value> {
        self.map.get(key)
    }

    #[inline(always)]
    pub fn contains_key(&self, key: &str) -> bool {
        self.map.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> + '_ {
        self.map.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn insert_raw<K, V>(&mut self, key: K, value: V) -> Option<Value>
        where K: Into<String>, V: Into<Value>
    {
        self.map.insert(key.into(), value.into())
    }

    /// Insert if no value for key exists.
    pub fn get_or_insert_raw<K, V>(&mut self, key: K, value: V) -> &Value
        where K: Into<String>, V: Into<Value>
    {
        self.map.entry(key.into()).or_insert_with(|| value.into())
    }

    pub fn remove_raw<K: Borrow<str>>(&mut self, key: K) -> Option<Value> {
        self.map.remove(key.borrow())
    }

    /// Returns the value for `K`, or the raw value if it has the wrong type.
    pub fn get<K: MetaKey>(&self, _: K) -> Option<Result<K::Value, Value>> {
        let value = self.get_raw(K::KEY)?;
        Some(serde_json::from_value(value.clone()).map_err(|_| value.clone()))
    }

    /// The value for `K` as a string, when it is one.
    pub fn get_str<K: MetaKey>(&self, _: K) -> Option<&str> {
        self.get_raw(K::KEY).and_then(|v| v.as_str())
    }

    #[inline(always)]
    pub fn contains<K: MetaKey>(&self, _: K) -> bool {
        self.contains_key(K::KEY)
    }

    pub fn insert<K: MetaKey>(&mut self, _: K, value: K::Value) -> Result<Option<Value>> {
        Ok(self.insert_raw(K::KEY, serde_json::to_value(value)?))
    }

    pub fn remove<K: MetaKey>(&mut self, _: K) -> Option<Value> {
        self.remove_raw(K::KEY)
    }

    /// Inserts every entry of `dict`, overwriting existing keys.
    pub fn append_all(&mut self, dict: &Dict) {
        for (k, v) in dict {
            self.insert_raw(k.clone(), v.clone());
        }
    }

    /// Inserts entries of `other` whose keys are not already present.
    pub fn fill_from(&mut self, other: &Metadata) {
        for (k, v) in other.iter() {
            self.get_or_insert_raw(k, v.clone());
        }
    }

    pub fn to_dict(&self) -> Dict {
        self.map.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Metadata {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let map = iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect();
        Metadata { map }
    }
}

impl fmt::Display for Metadata {
    #[inline(always)]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#?}", self.map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn typed_keys_read_raw_values() {
        let mut meta = Metadata::new();
        meta.insert(Layout, "post".into()).unwrap();
        assert_eq!(meta.get(Layout), Some(Ok("post".to_string())));
        assert_eq!(meta.get_str(Layout), Some("post"));

        meta.insert_raw("date", 7);
        assert_eq!(meta.get(Date), Some(Err(json!(7))));
        assert!(meta.get_str(Date).is_none());
    }

    #[test]
    fn fill_from_keeps_existing_keys() {
        let mut page: Metadata = [("title", "Page")].into_iter().collect();
        let layout: Metadata = [("title", "Layout"), ("author", "me")].into_iter().collect();
        page.fill_from(&layout);
        assert_eq!(page.get_raw("title"), Some(&json!("Page")));
        assert_eq!(page.get_raw("author"), Some(&json!("me")));
    }
}
