use http::uri::Authority;
use http::{header, Request};

use crate::settings::TracingConfig;

/// 决定请求是否需要创建 span
///
/// 路径按段前缀匹配（`/health` 匹配 `/health/live`，不匹配 `/healthz`），
/// Host 按子串匹配，均忽略大小写。
#[derive(Debug, Clone, Default)]
pub struct RequestFilter {
    ignore_paths: Vec<String>,
    ignore_hosts: Vec<String>,
}

impl RequestFilter {
    pub fn new<P, H>(ignore_paths: P, ignore_hosts: H) -> Self
    where
        P: IntoIterator,
        P::Item: AsRef<str>,
        H: IntoIterator,
        H::Item: AsRef<str>,
    {
        let ignore_paths = ignore_paths
            .into_iter()
            .map(|p| p.as_ref().trim().trim_end_matches('/').to_ascii_lowercase())
            .filter(|p| !p.is_empty())
            .collect();
        let ignore_hosts = ignore_hosts
            .into_iter()
            .map(|h| h.as_ref().trim().to_ascii_lowercase())
            .filter(|h| !h.is_empty())
            .collect();

        Self {
            ignore_paths,
            ignore_hosts,
        }
    }

    pub fn from_config(tracing: &TracingConfig) -> Self {
        Self::new(&tracing.ignore_paths, &tracing.ignore_hosts)
    }

    pub fn allows<B>(&self, request: &Request<B>) -> bool {
        if self.ignores_path(request.uri().path()) {
            return false;
        }

        match request_host(request) {
            Some(host) => !self.ignores_host(&host),
            None => true,
        }
    }

    pub fn ignores_path(&self, path: &str) -> bool {
        let path = path.to_ascii_lowercase();
        self.ignore_paths.iter().any(|prefix| {
            path.strip_prefix(prefix.as_str())
                .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
        })
    }

    pub fn ignores_host(&self, host: &str) -> bool {
        let host = host.to_ascii_lowercase();
        self.ignore_hosts
            .iter()
            .any(|ignored| host.contains(ignored.as_str()))
    }
}

/// 请求的目标主机，不含端口
fn request_host<B>(request: &Request<B>) -> Option<String> {
    if let Some(host) = request.uri().host() {
        return Some(host.to_owned());
    }

    let value = request.headers().get(header::HOST)?.to_str().ok()?;
    value
        .parse::<Authority>()
        .ok()
        .map(|authority| authority.host().to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(uri: &str, host: Option<&str>) -> Request<()> {
        let mut builder = Request::builder().uri(uri);
        if let Some(host) = host {
            builder = builder.header(header::HOST, host);
        }
        builder.body(()).unwrap()
    }

    #[test]
    fn default_paths_are_ignored_by_segment() {
        let filter = RequestFilter::from_config(&TracingConfig::default());

        assert!(filter.ignores_path("/health"));
        assert!(filter.ignores_path("/health/ready"));
        assert!(filter.ignores_path("/HEALTH/live"));
        assert!(filter.ignores_path("/metrics"));
        assert!(!filter.ignores_path("/healthz"));
        assert!(!filter.ignores_path("/orders/42"));
        assert!(!filter.ignores_path("/orders/health"));
    }

    #[test]
    fn trailing_slash_in_config_is_normalized() {
        let filter = RequestFilter::new(["/internal/"], Vec::<String>::new());
        assert!(filter.ignores_path("/internal"));
        assert!(filter.ignores_path("/internal/debug"));
    }

    #[test]
    fn hosts_match_without_port() {
        let filter = RequestFilter::new(Vec::<String>::new(), ["Monitor.Internal"]);

        assert!(!filter.allows(&request("/orders", Some("monitor.internal:8080"))));
        assert!(!filter.allows(&request("http://monitor.internal/orders", None)));
        assert!(filter.allows(&request("/orders", Some("api.example.com"))));
        assert!(filter.allows(&request("/orders", None)));
    }

    #[test]
    fn empty_filter_allows_everything() {
        let filter = RequestFilter::default();
        assert!(filter.allows(&request("/health", Some("localhost"))));
    }
}
