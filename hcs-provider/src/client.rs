//! REST client shared by every service module
//!
//! A [`ServiceClient`] is bound to one service endpoint and one project. It
//! adds the token header to each request, turns non-2xx answers into
//! [`HcsError::Api`] and decodes JSON bodies.

use log::debug;
use reqwest::Method;
use serde::Serialize;
use serde::de::DeserializeOwned;
use url::Url;

use crate::error::{HcsError, HcsResult};

const AUTH_HEADER: &str = "X-Auth-Token";

#[derive(Debug, Clone)]
pub struct ServiceClient {
    http: reqwest::Client,
    base: Url,
    project_id: String,
    token: String,
}

impl ServiceClient {
    pub fn new(http: reqwest::Client, base: Url, project_id: &str, token: &str) -> Self {
        Self {
            http,
            base,
            project_id: project_id.to_string(),
            token: token.to_string(),
        }
    }

    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    /// Resolve a path relative to the service base URL
    pub fn url(&self, path: &str) -> HcsResult<Url> {
        self.base
            .join(path.trim_start_matches('/'))
            .map_err(|e| HcsError::ClientConfig(format!("invalid request path '{}': {}", path, e)))
    }

    /// GET and decode the JSON body
    pub async fn get<T>(&self, path: &str) -> HcsResult<T>
    where
        T: DeserializeOwned,
    {
        self.execute(Method::GET, path, None::<&()>, None::<&()>)
            .await
    }

    /// GET with query parameters; `None` fields are left out
    pub async fn get_query<Q, T>(&self, path: &str, query: &Q) -> HcsResult<T>
    where
        Q: Serialize,
        T: DeserializeOwned,
    {
        self.execute(Method::GET, path, Some(query), None::<&()>)
            .await
    }

    pub async fn post<B, T>(&self, path: &str, body: &B) -> HcsResult<T>
    where
        B: Serialize,
        T: DeserializeOwned,
    {
        self.execute(Method::POST, path, None::<&()>, Some(body))
            .await
    }

    pub async fn put<B, T>(&self, path: &str, body: &B) -> HcsResult<T>
    where
        B: Serialize,
        T: DeserializeOwned,
    {
        self.execute(Method::PUT, path, None::<&()>, Some(body))
            .await
    }

    /// POST where the response body is ignored
    pub async fn post_no_content<B>(&self, path: &str, body: &B) -> HcsResult<()>
    where
        B: Serialize,
    {
        self.send(Method::POST, path, None::<&()>, Some(body))
            .await
            .map(|_| ())
    }

    /// PUT where the response body is ignored
    pub async fn put_no_content<B>(&self, path: &str, body: &B) -> HcsResult<()>
    where
        B: Serialize,
    {
        self.send(Method::PUT, path, None::<&()>, Some(body))
            .await
            .map(|_| ())
    }

    /// DELETE where the response body is ignored
    pub async fn delete<Q>(&self, path: &str, query: Option<&Q>) -> HcsResult<()>
    where
        Q: Serialize,
    {
        self.send(Method::DELETE, path, query, None::<&()>)
            .await
            .map(|_| ())
    }

    async fn execute<Q, B, T>(
        &self,
        method: Method,
        path: &str,
        query: Option<&Q>,
        body: Option<&B>,
    ) -> HcsResult<T>
    where
        Q: Serialize,
        B: Serialize,
        T: DeserializeOwned,
    {
        let (url, bytes) = self.send(method, path, query, body).await?;
        serde_json::from_slice(&bytes).map_err(|e| HcsError::Decode {
            url,
            message: e.to_string(),
        })
    }

    /// Send the request and return the URL and the raw body of a 2xx answer
    async fn send<Q, B>(
        &self,
        method: Method,
        path: &str,
        query: Option<&Q>,
        body: Option<&B>,
    ) -> HcsResult<(String, Vec<u8>)>
    where
        Q: Serialize,
        B: Serialize,
    {
        let url = self.url(path)?;
        debug!("{} {}", method, url);

        let mut request = self
            .http
            .request(method.clone(), url.clone())
            .header(AUTH_HEADER, &self.token);
        if let Some(query) = query {
            request = request.query(query);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await?;
        let status = response.status();
        let url = response.url().to_string();
        let bytes = response.bytes().await?;

        if !status.is_success() {
            return Err(HcsError::Api {
                method: method.to_string(),
                url,
                status: status.as_u16(),
                body: String::from_utf8_lossy(&bytes).into_owned(),
            });
        }
        Ok((url, bytes.to_vec()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[derive(Debug, Deserialize)]
    struct Image {
        id: String,
    }

    fn client(server: &MockServer) -> ServiceClient {
        let base = Url::parse(&format!("{}/", server.uri())).unwrap();
        ServiceClient::new(reqwest::Client::new(), base, "proj", "secret-token")
    }

    #[tokio::test]
    async fn get_sends_token_and_query() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v2/cloudimages"))
            .and(query_param("name", "ubuntu"))
            .and(header("X-Auth-Token", "secret-token"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"id": "img-1"})),
            )
            .mount(&server)
            .await;

        #[derive(Serialize)]
        struct Query<'a> {
            name: &'a str,
            #[serde(skip_serializing_if = "Option::is_none")]
            id: Option<&'a str>,
        }

        let image: Image = client(&server)
            .get_query("/v2/cloudimages", &Query { name: "ubuntu", id: None })
            .await
            .unwrap();
        assert_eq!(image.id, "img-1");
    }

    #[tokio::test]
    async fn non_success_is_api_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404).set_body_string("itemNotFound"))
            .mount(&server)
            .await;

        let err = client(&server)
            .get::<Image>("v1/proj/cloudservers/missing")
            .await
            .unwrap_err();
        assert!(err.is_not_found());
        assert!(err.to_string().contains("itemNotFound"));
    }

    #[tokio::test]
    async fn empty_body_without_content() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/v2.1/proj/servers/srv-1/metadata/env"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        client(&server)
            .delete::<()>("v2.1/proj/servers/srv-1/metadata/env", None)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn undecodable_body_is_decode_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let err = client(&server).get::<Image>("v2/x").await.unwrap_err();
        assert!(matches!(err, HcsError::Decode { .. }));
    }
}
