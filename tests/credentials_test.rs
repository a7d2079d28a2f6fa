//! Credentials Integration Tests
//!
//! Covers fetching signed-POST bundles from a credentials service and how a
//! missing bundle fails a batch before anything is uploaded.

mod common;

#[cfg(test)]
mod tests {
    use super::common::{self, TestEnv, TEST_BUCKET, TEST_PREFIX};
    use async_trait::async_trait;
    use mockall::mock;
    use s3_batch_uploader::s3::{
        Credentials, CredentialsError, CredentialsProvider, HttpCredentialsProvider,
    };
    use s3_batch_uploader::upload::UploadState;
    use serde_json::json;
    use std::sync::Arc;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    mock! {
        pub Provider {}

        #[async_trait]
        impl CredentialsProvider for Provider {
            async fn credentials(&self) -> Option<Credentials>;
        }
    }

    fn service_body() -> serde_json::Value {
        let creds = common::credentials();
        json!({
            "bucket": creds.bucket,
            "uniqueFilePrefix": creds.unique_file_prefix,
            "AWSAccessKeyId": creds.access_key_id,
            "policy": creds.policy,
            "signature": creds.signature,
            "contentType": creds.content_type,
        })
    }

    #[tokio::test]
    async fn test_fetch_parses_service_response() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/credentials"))
            .and(header("authorization", "Bearer secret-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(service_body()))
            .expect(1)
            .mount(&server)
            .await;

        let provider = HttpCredentialsProvider::new(format!("{}/credentials", server.uri()))
            .unwrap()
            .with_bearer_token("secret-token");

        let creds = provider.fetch().await.unwrap();
        assert_eq!(creds, common::credentials());
    }

    #[tokio::test]
    async fn test_fetch_reports_service_status() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/credentials"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let provider =
            HttpCredentialsProvider::new(format!("{}/credentials", server.uri())).unwrap();

        let result = provider.fetch().await;
        assert!(matches!(result, Err(CredentialsError::UnexpectedStatus(503))));
        assert!(provider.credentials().await.is_none());
    }

    #[tokio::test]
    async fn test_fetch_rejects_incomplete_bundle() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/credentials"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "bucket": "",
                "uniqueFilePrefix": TEST_PREFIX,
                "AWSAccessKeyId": "AKIA",
                "policy": "cG9saWN5",
                "signature": "sig",
                "contentType": "image/jpeg",
            })))
            .mount(&server)
            .await;

        let provider =
            HttpCredentialsProvider::new(format!("{}/credentials", server.uri())).unwrap();

        assert!(provider.fetch().await.is_err());
        assert!(provider.credentials().await.is_none());
    }

    #[tokio::test]
    async fn test_each_batch_fetches_fresh_credentials() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/credentials"))
            .respond_with(ResponseTemplate::new(200).set_body_json(service_body()))
            .expect(2)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path(format!("/{}/", TEST_BUCKET)))
            .respond_with(ResponseTemplate::new(201))
            .expect(3)
            .mount(&server)
            .await;

        let (_dir, paths) = common::write_files(&[("a.jpg", "a"), ("b.jpg", "b"), ("c.jpg", "c")]);
        let provider =
            HttpCredentialsProvider::new(format!("{}/credentials", server.uri())).unwrap();
        let env = TestEnv::new(&server.uri(), Arc::new(provider));

        let first = env
            .manager
            .upload(paths[..2].to_vec(), &env.listener)
            .wait()
            .await
            .unwrap();
        let second = env
            .manager
            .upload_one(paths[2].clone(), &env.listener)
            .wait()
            .await
            .unwrap();
        env.drain().await;

        assert!(first.is_completed());
        assert!(second.is_completed());
    }

    #[tokio::test]
    async fn test_unavailable_credentials_fail_before_upload() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/credentials"))
            .respond_with(ResponseTemplate::new(500))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(201))
            .expect(0)
            .mount(&server)
            .await;

        let (_dir, paths) = common::write_files(&[("a.jpg", "a"), ("b.jpg", "b")]);
        let provider =
            HttpCredentialsProvider::new(format!("{}/credentials", server.uri())).unwrap();
        let env = TestEnv::new(&server.uri(), Arc::new(provider));

        let outcome = env
            .manager
            .upload(paths, &env.listener)
            .wait()
            .await
            .unwrap();
        let recorder = env.drain().await;

        assert_eq!(outcome.state, UploadState::Aborted);
        assert_eq!(outcome.urls, vec![String::new(), String::new()]);
        assert_eq!(recorder.events(), vec!["failed(credentials_unavailable, 0)"]);
    }

    #[tokio::test]
    async fn test_provider_consulted_once_per_batch() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(201))
            .expect(2)
            .mount(&server)
            .await;

        let mut provider = MockProvider::new();
        provider
            .expect_credentials()
            .times(1)
            .returning(|| Some(common::credentials()));

        let (_dir, paths) = common::write_files(&[("a.jpg", "a"), ("b.jpg", "b")]);
        let env = TestEnv::new(&server.uri(), Arc::new(provider));

        let outcome = env
            .manager
            .upload(paths, &env.listener)
            .wait()
            .await
            .unwrap();
        let recorder = env.drain().await;

        assert!(outcome.is_completed());
        assert_eq!(recorder.events().len(), 3);
    }

    #[tokio::test]
    async fn test_provider_returning_none_aborts() {
        let server = MockServer::start().await;

        let mut provider = MockProvider::new();
        provider.expect_credentials().times(1).returning(|| None);

        let (_dir, paths) = common::write_files(&[("a.jpg", "a")]);
        let env = TestEnv::new(&server.uri(), Arc::new(provider));

        let outcome = env
            .manager
            .upload(paths, &env.listener)
            .wait()
            .await
            .unwrap();
        let recorder = env.drain().await;

        assert_eq!(outcome.state, UploadState::Aborted);
        assert_eq!(recorder.events(), vec!["failed(credentials_unavailable, 0)"]);
    }
}
