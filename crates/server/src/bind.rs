//! Request parameter binding.
//!
//! Each method decodes one source into the caller's type and returns the
//! codec's error unchanged as a [`BindError`]. Nothing here aborts the
//! request; the handler decides what a bad input means.

use ferrule_core::error::BindError;
use serde::de::DeserializeOwned;

use crate::context::Context;

const FORM_URLENCODED: &str = "application/x-www-form-urlencoded";

impl Context {
    /// Decodes the query string. Fields use their serde names.
    pub fn bind_query<T: DeserializeOwned>(&self) -> Result<T, BindError> {
        serde_urlencoded::from_str(self.query()).map_err(BindError::Query)
    }

    /// Decodes an urlencoded body; the query string is ignored.
    pub fn bind_post_form<T: DeserializeOwned>(&self) -> Result<T, BindError> {
        let pairs = self.request_post_form_params().map_err(BindError::Form)?;
        serde_urlencoded::from_str(&encode_pairs(&pairs)).map_err(BindError::Form)
    }

    /// Decodes query string and urlencoded body together. On a key present in
    /// both, the body wins.
    pub fn bind_form<T: DeserializeOwned>(&self) -> Result<T, BindError> {
        let pairs = self.request_input_params().map_err(BindError::Form)?;
        serde_urlencoded::from_str(&encode_pairs(&pairs)).map_err(BindError::Form)
    }

    pub fn bind_json<T: DeserializeOwned>(&self) -> Result<T, BindError> {
        Ok(serde_json::from_slice(self.raw_data())?)
    }

    /// Decodes the matched path parameters, e.g. `id` for `/users/{id}`.
    pub fn bind_uri<T: DeserializeOwned>(&self) -> Result<T, BindError> {
        serde_urlencoded::from_str(&encode_pairs(self.params())).map_err(BindError::Path)
    }

    /// Urlencoded body pairs. Empty unless the request declares an urlencoded body.
    pub fn request_post_form_params(
        &self,
    ) -> Result<Vec<(String, String)>, serde_urlencoded::de::Error> {
        if !self.is_form_body() {
            return Ok(Vec::new());
        }
        serde_urlencoded::from_bytes(self.raw_data())
    }

    /// Query and body pairs merged, body values replacing query values of the same key.
    pub fn request_input_params(
        &self,
    ) -> Result<Vec<(String, String)>, serde_urlencoded::de::Error> {
        let query: Vec<(String, String)> = serde_urlencoded::from_str(self.query())?;
        let form = self.request_post_form_params()?;
        let mut merged: Vec<(String, String)> = query
            .into_iter()
            .filter(|(k, _)| !form.iter().any(|(fk, _)| fk == k))
            .collect();
        merged.extend(form);
        Ok(merged)
    }

    fn is_form_body(&self) -> bool {
        self.content_type()
            .and_then(|ct| ct.split(';').next())
            .is_some_and(|mime| mime.trim().eq_ignore_ascii_case(FORM_URLENCODED))
    }
}

fn encode_pairs(pairs: &[(String, String)]) -> String {
    pairs
        .iter()
        .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
        .collect::<Vec<_>>()
        .join("&")
}

#[cfg(test)]
mod tests {
    use axum::http::Request;
    use bytes::Bytes;
    use ferrule_core::error::BindError;
    use serde::Deserialize;

    use crate::pool::ContextPool;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Search {
        name: String,
        page: u32,
    }

    #[derive(Debug, Deserialize, PartialEq)]
    struct UserPath {
        id: u64,
    }

    fn pool() -> ContextPool {
        ContextPool::new(4)
    }

    fn parts(uri: &str, content_type: Option<&str>) -> axum::http::request::Parts {
        let mut builder = Request::builder().method("POST").uri(uri);
        if let Some(ct) = content_type {
            builder = builder.header("content-type", ct);
        }
        builder.body(()).unwrap().into_parts().0
    }

    #[test]
    fn test_bind_query() {
        let pool = pool();
        let ctx = pool.acquire(parts("/s?name=a%20b&page=2", None), Bytes::new(), Vec::new());
        let search: Search = ctx.bind_query().unwrap();
        assert_eq!(search, Search { name: "a b".into(), page: 2 });
    }

    #[test]
    fn test_bind_query_type_mismatch() {
        let pool = pool();
        let ctx = pool.acquire(parts("/s?name=a&page=two", None), Bytes::new(), Vec::new());
        let err = ctx.bind_query::<Search>().unwrap_err();
        assert!(matches!(err, BindError::Query(_)));
    }

    #[test]
    fn test_bind_post_form_ignores_query() {
        let pool = pool();
        let ctx = pool.acquire(
            parts(
                "/s?name=fromquery&page=1",
                Some("application/x-www-form-urlencoded; charset=utf-8"),
            ),
            Bytes::from_static(b"name=frombody&page=3"),
            Vec::new(),
        );
        let search: Search = ctx.bind_post_form().unwrap();
        assert_eq!(search, Search { name: "frombody".into(), page: 3 });
    }

    #[test]
    fn test_bind_post_form_requires_form_content_type() {
        let pool = pool();
        let ctx = pool.acquire(
            parts("/s", Some("application/json")),
            Bytes::from_static(b"name=x&page=3"),
            Vec::new(),
        );
        assert!(matches!(ctx.bind_post_form::<Search>(), Err(BindError::Form(_))));
    }

    #[test]
    fn test_bind_form_body_wins() {
        let pool = pool();
        let ctx = pool.acquire(
            parts("/s?name=fromquery&page=1", Some("application/x-www-form-urlencoded")),
            Bytes::from_static(b"name=frombody"),
            Vec::new(),
        );
        let search: Search = ctx.bind_form().unwrap();
        assert_eq!(search, Search { name: "frombody".into(), page: 1 });
    }

    #[test]
    fn test_bind_json() {
        let pool = pool();
        let ctx = pool.acquire(
            parts("/s", Some("application/json")),
            Bytes::from_static(br#"{"name":"x","page":9}"#),
            Vec::new(),
        );
        let search: Search = ctx.bind_json().unwrap();
        assert_eq!(search.page, 9);
        // the cached body can be decoded again
        let again: serde_json::Value = ctx.bind_json().unwrap();
        assert_eq!(again["name"], "x");
    }

    #[test]
    fn test_bind_json_error_surfaces_detail() {
        let pool = pool();
        let ctx = pool.acquire(
            parts("/s", Some("application/json")),
            Bytes::from_static(br#"{"name":"x","page":"nine"}"#),
            Vec::new(),
        );
        let err = ctx.bind_json::<Search>().unwrap_err();
        assert!(matches!(err, BindError::Json(_)));
        assert!(err.to_string().contains("invalid type"));
    }

    #[test]
    fn test_bind_uri() {
        let pool = pool();
        let ctx = pool.acquire(
            parts("/users/42", None),
            Bytes::new(),
            vec![("id".into(), "42".into())],
        );
        let path: UserPath = ctx.bind_uri().unwrap();
        assert_eq!(path, UserPath { id: 42 });

        let ctx = pool.acquire(
            parts("/users/abc", None),
            Bytes::new(),
            vec![("id".into(), "abc".into())],
        );
        assert!(matches!(ctx.bind_uri::<UserPath>(), Err(BindError::Path(_))));
    }

    #[test]
    fn test_input_params_merge() {
        let pool = pool();
        let ctx = pool.acquire(
            parts("/s?a=1&b=2", Some("application/x-www-form-urlencoded")),
            Bytes::from_static(b"b=3&c=4"),
            Vec::new(),
        );
        let merged = ctx.request_input_params().unwrap();
        assert_eq!(
            merged,
            vec![
                ("a".to_string(), "1".to_string()),
                ("b".to_string(), "3".to_string()),
                ("c".to_string(), "4".to_string()),
            ]
        );
    }
}
