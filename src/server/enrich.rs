use http::{header, HeaderMap, Method, Request, Uri, Version};
use opentelemetry::KeyValue;

/// 已认证的用户标识，由上游认证层写入 request extensions
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserIdentity(pub String);

impl UserIdentity {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

/// 提供给 [`RequestEnricher`] 的只读请求信息
#[derive(Debug)]
pub struct RequestMetadata<'a> {
    pub method: &'a Method,
    pub uri: &'a Uri,
    pub version: Version,
    pub headers: &'a HeaderMap,
}

impl<'a> RequestMetadata<'a> {
    pub fn from_request<B>(request: &'a Request<B>) -> Self {
        Self {
            method: request.method(),
            uri: request.uri(),
            version: request.version(),
            headers: request.headers(),
        }
    }
}

/// 按部署定制的附加 span 属性
pub trait RequestEnricher: Send + Sync {
    fn enrich(&self, request: &RequestMetadata<'_>) -> Vec<KeyValue>;
}

impl<F> RequestEnricher for F
where
    F: Fn(&RequestMetadata<'_>) -> Vec<KeyValue> + Send + Sync,
{
    fn enrich(&self, request: &RequestMetadata<'_>) -> Vec<KeyValue> {
        self(request)
    }
}

/// 记录协议版本和请求体大小
#[derive(Debug, Clone, Copy, Default)]
pub struct ProtocolEnricher;

impl RequestEnricher for ProtocolEnricher {
    fn enrich(&self, request: &RequestMetadata<'_>) -> Vec<KeyValue> {
        let mut attributes = vec![KeyValue::new(
            "http.request.protocol",
            format!("{:?}", request.version),
        )];

        let body_size = request
            .headers
            .get(header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<i64>().ok());
        if let Some(size) = body_size {
            attributes.push(KeyValue::new("http.request.body.size", size));
        }

        attributes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opentelemetry::Value;

    #[test]
    fn protocol_enricher_reads_version_and_length() {
        let request = Request::builder()
            .method(Method::POST)
            .uri("/orders")
            .header(header::CONTENT_LENGTH, "128")
            .body(())
            .unwrap();

        let attributes = ProtocolEnricher.enrich(&RequestMetadata::from_request(&request));

        assert_eq!(attributes.len(), 2);
        assert_eq!(attributes[0].value, Value::from("HTTP/1.1".to_string()));
        assert_eq!(attributes[1].value, Value::I64(128));
    }

    #[test]
    fn closures_are_enrichers() {
        let tenant = |request: &RequestMetadata<'_>| {
            request
                .headers
                .get("x-tenant")
                .and_then(|v| v.to_str().ok())
                .map(|v| vec![KeyValue::new("tenant.id", v.to_owned())])
                .unwrap_or_default()
        };

        let request = Request::builder()
            .uri("/orders")
            .header("x-tenant", "acme")
            .body(())
            .unwrap();

        let attributes = tenant.enrich(&RequestMetadata::from_request(&request));
        assert_eq!(attributes, vec![KeyValue::new("tenant.id", "acme".to_string())]);
    }
}
