//! S3-compatible handlers (path-style addressing).
//! Streams object bodies to avoid buffering in memory and delegates storage
//! concerns to `StorageService`. Errors are reported as bare status codes.

use crate::{
    app_state::S3Settings,
    errors::status_for,
    models::{actor::Actor, bucket::Bucket, object::Object},
    services::storage_service::{ListObjectsParams, StorageError, StorageService},
};
use axum::{
    body::Body,
    extract::{Path, Query, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use chrono::{DateTime, SecondsFormat, Utc};
use futures::StreamExt;
use serde::Deserialize;
use std::io;
use tokio_util::io::ReaderStream;

/// Core error rendered the S3 way: status only, empty body.
#[derive(Debug)]
pub struct S3Error(pub StorageError);

impl From<StorageError> for S3Error {
    fn from(err: StorageError) -> Self {
        Self(err)
    }
}

impl IntoResponse for S3Error {
    fn into_response(self) -> Response {
        let status = status_for(&self.0);
        if status.is_server_error() {
            tracing::error!("s3 request failed: {}", self.0);
        } else {
            tracing::debug!("s3 request rejected: {}", self.0);
        }
        status.into_response()
    }
}

/// Query params accepted by ListObjects.
#[derive(Debug, Deserialize)]
pub struct ListObjectsQuery {
    pub prefix: Option<String>,
    #[serde(rename = "max-keys")]
    pub max_keys: Option<String>,
}

impl ListObjectsQuery {
    /// Requested page size, defaulting to and capped at the configured ceiling.
    fn max_keys(&self, ceiling: usize) -> usize {
        self.max_keys
            .as_deref()
            .and_then(|v| v.parse::<usize>().ok())
            .filter(|mk| *mk > 0)
            .map_or(ceiling, |mk| mk.min(ceiling))
    }
}

/// `GET /`: every bucket owned by the caller, fetched `max_keys` at a time.
pub async fn list_buckets(
    State(service): State<StorageService>,
    State(settings): State<S3Settings>,
    actor: Actor,
) -> Result<Response, S3Error> {
    let page_size = settings.max_keys.max(1);
    let mut buckets = Vec::new();
    loop {
        let page = service
            .list_buckets(&actor, page_size, buckets.len())
            .await?;
        let fetched = page.buckets.len();
        buckets.extend(page.buckets);
        if fetched < page_size || buckets.len() as i64 >= page.total {
            break;
        }
    }
    Ok(xml_response(build_list_buckets_xml(&actor, &buckets)))
}

/// `GET /{bucket}`: list objects, supports ?prefix=&max-keys=.
/// Always a single page: `IsTruncated` is reported as false.
pub async fn list_objects(
    State(service): State<StorageService>,
    State(settings): State<S3Settings>,
    actor: Actor,
    Path(bucket): Path<String>,
    Query(q): Query<ListObjectsQuery>,
) -> Result<Response, S3Error> {
    let params = ListObjectsParams {
        prefix: q.prefix.clone(),
        limit: q.max_keys(settings.max_keys),
        offset: 0,
    };
    let page = service
        .list_objects(&actor, bucket.as_str().into(), &params)
        .await?;

    Ok(xml_response(build_list_objects_xml(
        &bucket,
        &params,
        &page.objects,
    )))
}

/// `PUT /{bucket}/{*key}`: upload or overwrite an object.
pub async fn put_object(
    State(service): State<StorageService>,
    actor: Actor,
    Path((bucket, key)): Path<(String, String)>,
    headers: HeaderMap,
    body: Body,
) -> Result<Response, S3Error> {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_string());

    let stream = body.into_data_stream().map(|chunk| chunk.map_err(io::Error::other));

    let object = service
        .put_object(&actor, bucket.as_str().into(), &key, content_type, stream)
        .await?;

    let mut response = Response::new(Body::empty());
    *response.status_mut() = StatusCode::OK;
    if let Ok(value) = HeaderValue::from_str(&quoted(&object.etag)) {
        response.headers_mut().insert(header::ETAG, value);
    }
    Ok(response)
}

/// `GET /{bucket}/{*key}`: download an object as a streaming response.
pub async fn get_object(
    State(service): State<StorageService>,
    actor: Actor,
    Path((bucket, key)): Path<(String, String)>,
) -> Result<Response, S3Error> {
    let (meta, file) = service
        .get_object(&actor, bucket.as_str().into(), &key)
        .await?;
    let body = Body::from_stream(ReaderStream::new(file));

    let mut response = Response::new(body);
    *response.status_mut() = StatusCode::OK;
    set_object_headers(response.headers_mut(), &meta);
    Ok(response)
}

/// `HEAD /{bucket}/{*key}`: same headers as GET but no body.
pub async fn head_object(
    State(service): State<StorageService>,
    actor: Actor,
    Path((bucket, key)): Path<(String, String)>,
) -> Result<Response, S3Error> {
    let meta = service
        .stat_object(&actor, bucket.as_str().into(), &key)
        .await?;
    let mut response = Response::new(Body::empty());
    *response.status_mut() = StatusCode::OK;
    set_object_headers(response.headers_mut(), &meta);
    Ok(response)
}

/// `DELETE /{bucket}/{*key}`: 204 whether or not the key existed.
pub async fn delete_object(
    State(service): State<StorageService>,
    actor: Actor,
    Path((bucket, key)): Path<(String, String)>,
) -> Result<StatusCode, S3Error> {
    service
        .delete_object(&actor, bucket.as_str().into(), &key)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

fn xml_response(xml: String) -> Response {
    let mut response = Response::new(Body::from(xml));
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/xml"),
    );
    *response.status_mut() = StatusCode::OK;
    response
}

fn set_object_headers(headers: &mut HeaderMap, meta: &Object) {
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_str(&meta.content_type)
            .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream")),
    );
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(meta.size.max(0)));

    if let Ok(value) = HeaderValue::from_str(&quoted(&meta.etag)) {
        headers.insert(header::ETAG, value);
    }

    if let Ok(value) = HeaderValue::from_str(&http_date(&meta.updated_at)) {
        headers.insert(header::LAST_MODIFIED, value);
    }
}

fn quoted(etag: &str) -> String {
    format!("\"{}\"", etag)
}

/// IMF-fixdate, as used by `Last-Modified`.
fn http_date(at: &DateTime<Utc>) -> String {
    at.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

fn build_list_buckets_xml(actor: &Actor, buckets: &[Bucket]) -> String {
    let mut xml = String::from(
        r#"<?xml version="1.0" encoding="UTF-8"?><ListAllMyBucketsResult xmlns="http://s3.amazonaws.com/doc/2006-03-01/">"#,
    );
    xml.push_str(&format!(
        "<Owner><ID>{}</ID><DisplayName>{}</DisplayName></Owner>",
        actor.id, actor.id
    ));
    xml.push_str("<Buckets>");
    for bucket in buckets {
        xml.push_str("<Bucket>");
        xml.push_str(&format!("<Name>{}</Name>", xml_escape(&bucket.name)));
        xml.push_str(&format!(
            "<CreationDate>{}</CreationDate>",
            bucket
                .created_at
                .to_rfc3339_opts(SecondsFormat::Millis, true)
        ));
        xml.push_str("</Bucket>");
    }
    xml.push_str("</Buckets></ListAllMyBucketsResult>");
    xml
}

fn build_list_objects_xml(bucket: &str, params: &ListObjectsParams, objects: &[Object]) -> String {
    let mut xml = String::from(
        r#"<?xml version="1.0" encoding="UTF-8"?><ListBucketResult xmlns="http://s3.amazonaws.com/doc/2006-03-01/">"#,
    );
    xml.push_str(&format!("<Name>{}</Name>", xml_escape(bucket)));
    xml.push_str(&format!(
        "<Prefix>{}</Prefix>",
        xml_escape(params.prefix.as_deref().unwrap_or(""))
    ));
    xml.push_str("<Marker></Marker>");
    xml.push_str(&format!("<MaxKeys>{}</MaxKeys>", params.limit));
    xml.push_str(&format!("<KeyCount>{}</KeyCount>", objects.len()));
    xml.push_str("<IsTruncated>false</IsTruncated>");

    for obj in objects {
        xml.push_str("<Contents>");
        xml.push_str(&format!("<Key>{}</Key>", xml_escape(&obj.key)));
        xml.push_str(&format!(
            "<LastModified>{}</LastModified>",
            obj.updated_at.to_rfc3339_opts(SecondsFormat::Millis, true)
        ));
        xml.push_str(&format!("<ETag>{}</ETag>", xml_escape(&quoted(&obj.etag))));
        xml.push_str(&format!("<Size>{}</Size>", obj.size));
        xml.push_str("<StorageClass>STANDARD</StorageClass>");
        xml.push_str(&format!(
            "<Owner><ID>{}</ID><DisplayName></DisplayName></Owner>",
            obj.owner_id
        ));
        xml.push_str("</Contents>");
    }

    xml.push_str("</ListBucketResult>");
    xml
}

fn xml_escape(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn max_keys_defaults_and_caps() {
        let q = |v: Option<&str>| ListObjectsQuery {
            prefix: None,
            max_keys: v.map(String::from),
        };
        assert_eq!(q(None).max_keys(1000), 1000);
        assert_eq!(q(Some("10")).max_keys(1000), 10);
        assert_eq!(q(Some("5000")).max_keys(1000), 1000);
        assert_eq!(q(Some("0")).max_keys(1000), 1000);
        assert_eq!(q(Some("-3")).max_keys(1000), 1000);
    }

    #[test]
    fn last_modified_uses_http_date() {
        let at = Utc.with_ymd_and_hms(2024, 1, 5, 8, 9, 10).unwrap();
        assert_eq!(http_date(&at), "Fri, 05 Jan 2024 08:09:10 GMT");
    }

    #[test]
    fn listing_escapes_keys_and_quotes_etags() {
        let now = Utc::now();
        let obj = Object {
            id: 1,
            bucket_id: 1,
            key: "a&b<c>.txt".into(),
            storage_path: "1/1/a&b<c>.txt".into(),
            content_type: "text/plain".into(),
            size: 3,
            etag: "abc".into(),
            owner_id: 1,
            created_at: now,
            updated_at: now,
        };
        let params = ListObjectsParams {
            prefix: Some("a&".into()),
            limit: 10,
            offset: 0,
        };
        let xml = build_list_objects_xml("logs", &params, &[obj]);
        assert!(xml.contains("<Key>a&amp;b&lt;c&gt;.txt</Key>"));
        assert!(xml.contains("<Prefix>a&amp;</Prefix>"));
        assert!(xml.contains("<ETag>&quot;abc&quot;</ETag>"));
        assert!(xml.contains("<IsTruncated>false</IsTruncated>"));
    }
}
