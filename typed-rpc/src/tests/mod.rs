//! Cross-cutting test suites for typed-rpc
//!
//! Property-based tests use proptest; HTTP behavior is exercised in-process
//! through [`CompiledRouter::handle`](crate::CompiledRouter::handle).



#[cfg(test)]
pub mod error_tests;



#[cfg(test)]
pub(crate) mod support {
    use crate::CompiledRouter;
    use axum::body::Body;
    use axum::http::{Method, Request, StatusCode, header};
    use serde_json::Value;

    /// A finished in-process call.
    pub struct Answer {
        pub status: StatusCode,
        pub content_type: Option<String>,
        pub text: String,
    }

    impl Answer {
        pub fn json(&self) -> Value {
            serde_json::from_str(&self.text).unwrap()
        }
    }

    pub async fn call(router: &CompiledRouter, method: Method, uri: &str, body: Option<String>) -> Answer {
        let mut builder = Request::builder().method(method).uri(uri);
        if body.is_some() {
            builder = builder.header(header::CONTENT_TYPE, "application/json");
        }
        let request = builder.body(body.map(Body::from).unwrap_or_else(Body::empty)).unwrap();

        let response = router.handle(request).await;
        let status = response.status();
        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .map(|v| v.to_str().unwrap().to_string());
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        Answer {
            status,
            content_type,
            text: String::from_utf8(bytes.to_vec()).unwrap(),
        }
    }

    pub async fn get(router: &CompiledRouter, uri: &str) -> Answer {
        call(router, Method::GET, uri, None).await
    }

    pub async fn post(router: &CompiledRouter, uri: &str, body: Value) -> Answer {
        call(router, Method::POST, uri, Some(body.to_string())).await
    }

    /// Path and query of `path` with every field codec-encoded, as the client
    /// sends it.
    pub fn query_uri(path: &str, fields: &[(&str, crate::RichValue)]) -> String {
        let mut url = reqwest::Url::parse("http://localhost").unwrap().join(path).unwrap();
        {
            let mut pairs = url.query_pairs_mut();
            for (name, value) in fields {
                pairs.append_pair(name, &crate::encode(value));
            }
        }
        match url.query() {
            Some(query) => format!("{}?{}", url.path(), query),
            None => url.path().to_string(),
        }
    }
}
