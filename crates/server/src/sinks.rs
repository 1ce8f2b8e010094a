//! Reporting sinks fed by the notification fan-out.
//!
//! - `SpreadsheetSink` posts every grant, private ones included, as a form to
//!   a spreadsheet webhook. It is slow, so it runs detached on the background
//!   queue.
//! - `DashboardSink` pushes public grants to the office dashboard as an HTML
//!   card.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use tracing::debug;

use tokenbot_core::errors::DeliveryError;
use tokenbot_core::notify::{ReportSink, SinkRecord};

pub const SPREADSHEET_SINK: &str = "spreadsheet";
pub const DASHBOARD_SINK: &str = "dashboard";

fn http_client(timeout: Duration) -> Result<Client, DeliveryError> {
    Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|error| DeliveryError::Transport(error.to_string()))
}

fn transport(error: reqwest::Error) -> DeliveryError {
    DeliveryError::Transport(error.to_string())
}

pub struct SpreadsheetSink {
    http: Client,
    url: String,
}

#[derive(Serialize)]
struct SpreadsheetRow<'a> {
    giver: &'a str,
    recipient: &'a str,
    token_type: &'a str,
    reason: &'a str,
    private: bool,
    sent_at: &'a str,
    timestamp: i64,
}

impl<'a> From<&'a SinkRecord> for SpreadsheetRow<'a> {
    fn from(record: &'a SinkRecord) -> Self {
        Self {
            giver: &record.giver,
            recipient: &record.recipient,
            token_type: &record.token_id,
            reason: &record.reason,
            private: record.is_private,
            sent_at: &record.sent_at,
            timestamp: record.timestamp,
        }
    }
}

impl SpreadsheetSink {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, DeliveryError> {
        Ok(Self { http: http_client(timeout)?, url: url.into() })
    }
}

#[async_trait]
impl ReportSink for SpreadsheetSink {
    fn name(&self) -> &'static str {
        SPREADSHEET_SINK
    }

    fn detached(&self) -> bool {
        true
    }

    async fn publish(&self, record: &SinkRecord) -> Result<(), DeliveryError> {
        debug!(
            event_name = "sink.spreadsheet.request",
            giver = %record.giver,
            token_id = %record.token_id,
            "posting grant to spreadsheet"
        );
        let response = self
            .http
            .post(&self.url)
            .form(&SpreadsheetRow::from(record))
            .send()
            .await
            .map_err(transport)?;

        let status = response.status();
        if !status.is_success() {
            return Err(DeliveryError::Rejected {
                status: status.as_u16(),
                detail: "spreadsheet webhook".to_owned(),
            });
        }
        Ok(())
    }
}

pub struct DashboardSink {
    http: Client,
    url: String,
    access_key: SecretString,
    stream: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DashboardPayload<'a> {
    access_key: &'a str,
    stream_name: &'a str,
    point: DashboardPoint,
}

#[derive(Serialize)]
struct DashboardPoint {
    html: String,
}

impl DashboardSink {
    pub fn new(
        url: impl Into<String>,
        access_key: SecretString,
        stream: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, DeliveryError> {
        Ok(Self { http: http_client(timeout)?, url: url.into(), access_key, stream: stream.into() })
    }
}

#[async_trait]
impl ReportSink for DashboardSink {
    fn name(&self) -> &'static str {
        DASHBOARD_SINK
    }

    fn accepts_private(&self) -> bool {
        false
    }

    async fn publish(&self, record: &SinkRecord) -> Result<(), DeliveryError> {
        let payload = DashboardPayload {
            access_key: self.access_key.expose_secret(),
            stream_name: &self.stream,
            point: DashboardPoint { html: dashboard_card(record) },
        };
        debug!(
            event_name = "sink.dashboard.request",
            stream = %self.stream,
            recipient = %record.recipient,
            "pushing grant to dashboard"
        );

        let response =
            self.http.post(&self.url).json(&payload).send().await.map_err(transport)?;

        // The push api answers with html, so only the status matters.
        let status = response.status();
        if status != StatusCode::OK {
            return Err(DeliveryError::Rejected {
                status: status.as_u16(),
                detail: "dashboard push".to_owned(),
            });
        }
        Ok(())
    }
}

fn dashboard_card(record: &SinkRecord) -> String {
    let image = if record.token_image.is_empty() {
        String::new()
    } else {
        format!(
            "<img style='display:inline-block;vertical-align:top;margin-right:20px;' width='180' height='180' src='{}'/>",
            escape_html(&record.token_image)
        )
    };
    let token = if record.token_name.is_empty() { &record.token_id } else { &record.token_name };

    format!(
        "<div style='font-size:20px;display:flex;align-items:center;justify-content:center;height:100%;'>\
         {image}\
         <span style='text-align:left;vertical-align:top;display:inline-block;'>\
         <div style='margin-bottom:20px;'>{sent_at}</div>\
         <div style='font-size:40px;margin-bottom:8px;'>{recipient}</div>\
         <div>received {token} from {giver}</div>\
         <div style='font-style:italic;font-size:26px;margin-top:20px;'>&quot;{reason}&quot;</div>\
         </span></div>",
        sent_at = escape_html(&record.sent_at),
        recipient = escape_html(&record.recipient),
        token = escape_html(token),
        giver = escape_html(&record.giver),
        reason = escape_html(&record.reason),
    )
}

fn escape_html(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            other => escaped.push(other),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use axum::{extract::State, http::StatusCode, routing::post, Form, Json, Router};
    use secrecy::SecretString;
    use serde_json::Value;

    use tokenbot_core::errors::DeliveryError;
    use tokenbot_core::notify::{ReportSink, SinkRecord};

    use super::{dashboard_card, DashboardSink, SpreadsheetSink};

    type Captured<T> = Arc<Mutex<Vec<T>>>;

    fn record(private: bool) -> SinkRecord {
        SinkRecord {
            giver: "@alice".to_owned(),
            recipient: "@bob".to_owned(),
            token_id: "token-data".to_owned(),
            reason: "great <b>launch</b>".to_owned(),
            is_private: private,
            sent_at: "Wed, 14 Feb 2024 15:30:00 +0000".to_owned(),
            timestamp: 1_707_924_600_000_000_000,
            token_name: "Show Me the Data".to_owned(),
            token_image: "https://img.example/data.png".to_owned(),
        }
    }

    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let address = listener.local_addr().expect("address");
        tokio::spawn(async move {
            axum::serve(listener, router).await.ok();
        });
        format!("http://{address}/hook")
    }

    #[tokio::test]
    async fn spreadsheet_posts_the_flat_record_as_a_form() {
        let captured: Captured<HashMap<String, String>> = Arc::default();
        let router = Router::new()
            .route(
                "/hook",
                post(
                    |State(captured): State<Captured<HashMap<String, String>>>,
                     Form(fields): Form<HashMap<String, String>>| async move {
                        captured.lock().expect("lock").push(fields);
                        StatusCode::OK
                    },
                ),
            )
            .with_state(Arc::clone(&captured));
        let url = serve(router).await;

        let sink = SpreadsheetSink::new(url, Duration::from_secs(5)).expect("sink");
        assert!(sink.detached());
        assert!(sink.accepts_private());
        sink.publish(&record(true)).await.expect("publish");

        let rows = captured.lock().expect("lock").clone();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["giver"], "@alice");
        assert_eq!(rows[0]["token_type"], "token-data");
        assert_eq!(rows[0]["private"], "true");
        assert_eq!(rows[0]["sent_at"], "Wed, 14 Feb 2024 15:30:00 +0000");
        assert_eq!(rows[0]["timestamp"], "1707924600000000000");
    }

    #[tokio::test]
    async fn dashboard_pushes_json_and_rejects_non_ok_status() {
        let captured: Captured<Value> = Arc::default();
        let router = Router::new()
            .route(
                "/hook",
                post(|State(captured): State<Captured<Value>>, Json(body): Json<Value>| async move {
                    captured.lock().expect("lock").push(body);
                    StatusCode::OK
                }),
            )
            .with_state(Arc::clone(&captured));
        let url = serve(router).await;

        let sink = DashboardSink::new(
            url,
            SecretString::from("push-key".to_owned()),
            "recognition",
            Duration::from_secs(5),
        )
        .expect("sink");
        assert!(!sink.accepts_private());
        sink.publish(&record(false)).await.expect("publish");

        let bodies = captured.lock().expect("lock").clone();
        assert_eq!(bodies.len(), 1);
        assert_eq!(bodies[0]["accessKey"], "push-key");
        assert_eq!(bodies[0]["streamName"], "recognition");
        assert!(bodies[0]["point"]["html"].as_str().expect("html").contains("@bob"));

        let failing = serve(Router::new().route("/hook", post(|| async { StatusCode::ACCEPTED }))).await;
        let sink = DashboardSink::new(
            failing,
            SecretString::from("push-key".to_owned()),
            "recognition",
            Duration::from_secs(5),
        )
        .expect("sink");
        let error = sink.publish(&record(false)).await.expect_err("non-200 should fail");
        assert!(matches!(error, DeliveryError::Rejected { status: 202, .. }));
    }

    #[test]
    fn dashboard_card_escapes_user_text() {
        let card = dashboard_card(&record(false));
        assert!(card.contains("great &lt;b&gt;launch&lt;/b&gt;"));
        assert!(card.contains("received Show Me the Data from @alice"));
        assert!(card.contains("src='https://img.example/data.png'"));
    }
}
