use crate::api::{ApiConfig, ApiError};
use crate::auth::{Credentials, build_headers};
use anyhow::{Context, Result};
use chrono::{Duration as ChronoDuration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

/// Per-request timeout for ordinary resource calls
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Client for the REST resources (identity, repositories, search).
///
/// Every operation returns its failure as a value; nothing here panics or
/// propagates a transport fault to the caller.
#[derive(Debug, Clone)]
pub struct GitHubClient {
    base_url: String,
    http: reqwest::Client,
}

impl GitHubClient {
    pub fn new(config: &ApiConfig, credentials: Credentials) -> Result<Self> {
        let headers = build_headers(credentials.token.as_deref(), credentials.scheme);

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            base_url: config.api_url.trim_end_matches('/').to_string(),
            http,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn send_json(&self, request: reqwest::RequestBuilder) -> Result<Value, ApiError> {
        let resp = request.send().await?;
        let status = resp.status();

        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            tracing::debug!("Request failed: {} - {}", status, body);
            return Err(ApiError::from_status(status, &body));
        }

        resp.json::<Value>().await.map_err(ApiError::from)
    }

    /// Check the configured credential against `GET /user`.
    pub async fn verify_identity(&self) -> IdentityResult {
        let url = format!("{}/user", self.base_url);
        tracing::debug!("Verifying identity via {}", url);

        match self.send_json(self.http.get(&url)).await {
            Ok(user) => IdentityResult::Authenticated { user },
            Err(ApiError::Unauthorized) => IdentityResult::Unauthenticated {
                error: "Invalid or missing token".to_string(),
            },
            Err(e) => {
                let error = match e.status() {
                    Some(status) if !matches!(e, ApiError::Transport(_)) => {
                        format!("HTTP Error: {}", status)
                    }
                    _ => e.to_string(),
                };
                IdentityResult::Unauthenticated { error }
            }
        }
    }

    /// Repositories of `owner` (public list) or of the authenticated user.
    pub async fn try_list_repositories(&self, owner: Option<&str>) -> Result<Vec<Value>, ApiError> {
        let url = match owner {
            Some(owner) => format!("{}/users/{}/repos", self.base_url, owner),
            None => format!("{}/user/repos", self.base_url),
        };

        match self.send_json(self.http.get(&url)).await? {
            Value::Array(repos) => Ok(repos),
            other => Err(ApiError::Decode(format!(
                "expected a list of repositories, got {}",
                json_kind(&other)
            ))),
        }
    }

    /// Like [`try_list_repositories`](Self::try_list_repositories) but any
    /// failure is reported and an empty list returned.
    pub async fn list_repositories(&self, owner: Option<&str>) -> Vec<Value> {
        match self.try_list_repositories(owner).await {
            Ok(repos) => repos,
            Err(e) => {
                tracing::warn!("Error fetching repositories: {}", e);
                eprintln!("Error fetching repositories: {}", e);
                Vec::new()
            }
        }
    }

    /// Create a repository for the authenticated user.
    ///
    /// Not idempotent: a second call with the same name comes back as the
    /// remote's validation error.
    pub async fn create_repository(&self, repo: &NewRepository) -> Result<Value, ApiError> {
        let url = format!("{}/user/repos", self.base_url);

        tracing::info!(
            "Creating repository '{}' (private: {})",
            repo.name,
            repo.private
        );

        let created = self.send_json(self.http.post(&url).json(repo)).await?;
        tracing::info!("Repository '{}' created", repo.name);
        Ok(created)
    }

    /// Most starred repositories created within the last `days` days.
    pub async fn trending_repositories(
        &self,
        days: u32,
        top_n: u8,
    ) -> Result<Vec<TrendingRepository>, ApiError> {
        let since = trending_since(Utc::now().date_naive(), days);
        let url = format!("{}/search/repositories", self.base_url);
        let query = format!("created:>{}", since.format("%Y-%m-%d"));
        let per_page = top_n.clamp(1, 100).to_string();

        tracing::debug!("Searching trending repositories with q={}", query);

        let body = self
            .send_json(self.http.get(&url).query(&[
                ("q", query.as_str()),
                ("sort", "stars"),
                ("order", "desc"),
                ("per_page", per_page.as_str()),
            ]))
            .await?;

        let results: SearchResults =
            serde_json::from_value(body).map_err(|e| ApiError::Decode(e.to_string()))?;

        Ok(results.items)
    }
}

fn trending_since(today: NaiveDate, days: u32) -> NaiveDate {
    today - ChronoDuration::days(i64::from(days))
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Outcome of [`GitHubClient::verify_identity`]
#[derive(Debug, Clone, PartialEq)]
pub enum IdentityResult {
    /// Token accepted; carries the `/user` body verbatim
    Authenticated { user: Value },
    /// Token rejected or the call failed
    Unauthenticated { error: String },
}

impl IdentityResult {
    pub fn is_authenticated(&self) -> bool {
        matches!(self, IdentityResult::Authenticated { .. })
    }

    pub fn login(&self) -> Option<&str> {
        match self {
            IdentityResult::Authenticated { user } => user.get("login").and_then(Value::as_str),
            IdentityResult::Unauthenticated { .. } => None,
        }
    }

    /// `{authenticated: true, user}` or `{authenticated: false, error}`
    pub fn to_json(&self) -> Value {
        match self {
            IdentityResult::Authenticated { user } => serde_json::json!({
                "authenticated": true,
                "user": user,
            }),
            IdentityResult::Unauthenticated { error } => serde_json::json!({
                "authenticated": false,
                "error": error,
            }),
        }
    }
}

/// Request body for `POST /user/repos`
#[derive(Debug, Clone, Serialize)]
pub struct NewRepository {
    pub name: String,
    pub private: bool,
    pub description: String,
}

impl NewRepository {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            private: false,
            description: String::new(),
        }
    }

    pub fn private(mut self, private: bool) -> Self {
        self.private = private;
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

#[derive(Debug, Deserialize)]
struct SearchResults {
    items: Vec<TrendingRepository>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrendingRepository {
    pub full_name: String,
    pub stargazers_count: u64,
    pub html_url: String,
    pub description: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::{Arc, Mutex};
    use wiremock::matchers::{body_json, header, header_exists, method, path, query_param};
    use wiremock::{Mock, MockServer, Request, ResponseTemplate};

    fn client_for(server: &MockServer, creds: Credentials) -> GitHubClient {
        GitHubClient::new(&ApiConfig::with_base_url(&server.uri()), creds).unwrap()
    }

    #[tokio::test]
    async fn verify_identity_success_returns_user_body() {
        let server = MockServer::start().await;
        let user = serde_json::json!({"login": "octocat", "id": 1});

        Mock::given(method("GET"))
            .and(path("/user"))
            .and(header("authorization", "token ghp_valid"))
            .and(header("accept", "application/vnd.github.v3+json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(user.clone()))
            .expect(1)
            .mount(&server)
            .await;

        let result = client_for(&server, Credentials::from_token("ghp_valid"))
            .verify_identity()
            .await;

        assert_eq!(result, IdentityResult::Authenticated { user: user.clone() });
        assert_eq!(result.login(), Some("octocat"));
        assert_eq!(
            result.to_json(),
            serde_json::json!({"authenticated": true, "user": user})
        );
    }

    #[tokio::test]
    async fn verify_identity_401_is_invalid_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/user"))
            .respond_with(
                ResponseTemplate::new(401)
                    .set_body_json(serde_json::json!({"message": "Bad credentials"})),
            )
            .mount(&server)
            .await;

        let result = client_for(&server, Credentials::from_token("ghp_revoked"))
            .verify_identity()
            .await;

        assert_eq!(
            result.to_json(),
            serde_json::json!({"authenticated": false, "error": "Invalid or missing token"})
        );
    }

    #[tokio::test]
    async fn verify_identity_other_status_reports_code() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/user"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let result = client_for(&server, Credentials::anonymous())
            .verify_identity()
            .await;

        assert_eq!(
            result,
            IdentityResult::Unauthenticated {
                error: "HTTP Error: 503".to_string()
            }
        );
    }

    #[tokio::test]
    async fn verify_identity_network_failure_is_data() {
        // Port 1 is never bound, so the connection is refused.
        let client = GitHubClient::new(
            &ApiConfig::with_base_url("http://127.0.0.1:1"),
            Credentials::anonymous(),
        )
        .unwrap();

        match client.verify_identity().await {
            IdentityResult::Unauthenticated { error } => assert!(!error.is_empty()),
            other => panic!("expected failure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn anonymous_requests_carry_no_authorization() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/user"))
            .and(header_exists("authorization"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
            .expect(0)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/user"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let result = client_for(&server, Credentials::anonymous())
            .verify_identity()
            .await;
        assert!(!result.is_authenticated());
    }

    #[tokio::test]
    async fn list_repositories_for_owner_and_self() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/users/octocat/repos"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!([{"full_name": "octocat/hello-world"}])),
            )
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/user/repos"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                {"full_name": "me/one"},
                {"full_name": "me/two"}
            ])))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server, Credentials::from_token("ghp_valid"));

        let theirs = client.list_repositories(Some("octocat")).await;
        assert_eq!(theirs.len(), 1);
        assert_eq!(theirs[0]["full_name"], "octocat/hello-world");

        let mine = client.list_repositories(None).await;
        let names: Vec<_> = mine.iter().map(|r| r["full_name"].as_str()).collect();
        assert_eq!(names, vec![Some("me/one"), Some("me/two")]);
    }

    #[tokio::test]
    async fn list_repositories_failure_is_empty() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/users/ghost/repos"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/user/repos"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"oops": 1})))
            .mount(&server)
            .await;

        let client = client_for(&server, Credentials::anonymous());
        assert!(client.list_repositories(Some("ghost")).await.is_empty());
        assert!(matches!(
            client.try_list_repositories(Some("ghost")).await,
            Err(ApiError::NotFound)
        ));
        assert!(client.list_repositories(None).await.is_empty());
        assert!(matches!(
            client.try_list_repositories(None).await,
            Err(ApiError::Decode(_))
        ));
    }

    #[tokio::test]
    async fn create_repository_twice_surfaces_duplicate_error() {
        let server = MockServer::start().await;
        let existing = Arc::new(Mutex::new(HashSet::new()));
        let seen = existing.clone();

        Mock::given(method("POST"))
            .and(path("/user/repos"))
            .and(body_json(serde_json::json!({
                "name": "scratch",
                "private": true,
                "description": "test repo"
            })))
            .respond_with(move |req: &Request| {
                let body: Value = serde_json::from_slice(&req.body).unwrap();
                let name = body["name"].as_str().unwrap().to_string();
                if seen.lock().unwrap().insert(name.clone()) {
                    ResponseTemplate::new(201).set_body_json(serde_json::json!({
                        "name": name,
                        "full_name": format!("me/{}", name),
                        "private": body["private"],
                    }))
                } else {
                    ResponseTemplate::new(422).set_body_json(serde_json::json!({
                        "message": "Repository creation failed.",
                        "errors": [{"resource": "Repository", "code": "custom", "field": "name",
                                    "message": "name already exists on this account"}]
                    }))
                }
            })
            .expect(2)
            .mount(&server)
            .await;

        let client = client_for(&server, Credentials::from_token("ghp_valid"));
        let repo = NewRepository::new("scratch")
            .private(true)
            .description("test repo");

        let first = client.create_repository(&repo).await.unwrap();
        assert_eq!(first["full_name"], "me/scratch");

        let second = client.create_repository(&repo).await.unwrap_err();
        assert_eq!(second.status(), Some(422));
        assert!(second.to_string().contains("already exists"));
        assert_eq!(
            second.to_string(),
            "HTTP Error: 422 - Repository creation failed. (name already exists on this account)"
        );
        assert_eq!(existing.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn trending_repositories_query_and_parse() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search/repositories"))
            .and(query_param("sort", "stars"))
            .and(query_param("order", "desc"))
            .and(query_param("per_page", "2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "total_count": 2,
                "items": [
                    {"full_name": "a/rocket", "stargazers_count": 900,
                     "html_url": "https://github.com/a/rocket", "description": null},
                    {"full_name": "b/comet", "stargazers_count": 400,
                     "html_url": "https://github.com/b/comet", "description": "fast"}
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server, Credentials::anonymous());
        let repos = client.trending_repositories(7, 2).await.unwrap();

        assert_eq!(repos.len(), 2);
        assert_eq!(repos[0].full_name, "a/rocket");
        assert_eq!(repos[1].description.as_deref(), Some("fast"));

        let requests = server.received_requests().await.unwrap();
        let q = requests[0]
            .url
            .query_pairs()
            .find(|(k, _)| k == "q")
            .map(|(_, v)| v.into_owned())
            .unwrap();
        assert!(q.starts_with("created:>"), "query was {}", q);
    }

    #[test]
    fn trending_window_counts_back_from_today() {
        let today = NaiveDate::from_ymd_opt(2024, 3, 5).unwrap();
        assert_eq!(
            trending_since(today, 7),
            NaiveDate::from_ymd_opt(2024, 2, 27).unwrap()
        );
    }
}
