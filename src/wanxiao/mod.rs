//! Client for the Wanxiao ("完美校园") smart water & electricity service.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

const API_URL: &str = "https://xqh5.17wanxiao.com/smartWaterAndElectricityService/SWAEServlet";
const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

#[derive(Debug, Error)]
pub enum WanxiaoError {
    #[error("request error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("decode error: {0}")]
    Payload(#[from] serde_json::Error),
    #[error("api error: {0}")]
    Api(String),
}

/// One room bound to an account, with its remaining balance in 度.
#[derive(Debug, Clone, PartialEq)]
pub struct RoomInfo {
    pub room_name: String,
    pub balance: f64,
}

#[derive(Serialize)]
struct Param<'a> {
    cmd: &'a str,
    account: &'a str,
    timestamp: String,
}

/// Outer response envelope. `body` is a JSON document encoded as a
/// string inside the envelope.
#[derive(Deserialize)]
struct Envelope {
    #[serde(rename = "code_")]
    code: i64,
    #[serde(default)]
    body: String,
    #[serde(rename = "message_", default)]
    message: String,
}

#[derive(Deserialize)]
struct BodyPayload {
    #[serde(rename = "roomfullname", default)]
    room_full_name: String,
    #[serde(rename = "detaillist", default)]
    detail_list: Vec<Detail>,
}

#[derive(Deserialize)]
struct Detail {
    /// Remaining balance, returned as a string.
    #[serde(default)]
    odd: String,
}

#[derive(Clone, Debug)]
pub struct Client {
    http: reqwest::Client,
}

impl Client {
    pub fn new() -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .user_agent(USER_AGENT)
            .build()
            .expect("failed to build wanxiao http client");
        Self { http }
    }

    /// Queries the rooms bound to one account and their balances.
    /// Read-only on the provider side, safe to call repeatedly; a
    /// timeout surfaces as `WanxiaoError::Http`.
    pub async fn get_balance(
        &self,
        account: &str,
        customer_code: &str,
    ) -> Result<Vec<RoomInfo>, WanxiaoError> {
        let param = Param {
            cmd: "getbindroom",
            account,
            // Wire format example: 20251129230945222
            timestamp: Utc::now().format("%Y%m%d%H%M%S%3f").to_string(),
        };
        let param_json = serde_json::to_string(&param)?;

        let form = [
            ("param", param_json.as_str()),
            ("customercode", customer_code),
        ];

        let text = self
            .http
            .post(API_URL)
            .form(&form)
            .send()
            .await?
            .text()
            .await?;

        parse_response(&text)
    }
}

impl Default for Client {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_response(text: &str) -> Result<Vec<RoomInfo>, WanxiaoError> {
    let envelope: Envelope = serde_json::from_str(text)?;
    if envelope.code != 0 {
        return Err(WanxiaoError::Api(envelope.message));
    }

    let body: BodyPayload = serde_json::from_str(&envelope.body)?;

    // The room label lives at the body level, so every detail entry
    // shares it; `odd` carries the balance. A malformed balance reads
    // as 0.0, matching what the service sends for unmetered rooms.
    let room_name = body.room_full_name;
    let rooms = body
        .detail_list
        .into_iter()
        .map(|detail| RoomInfo {
            room_name: room_name.clone(),
            balance: detail.odd.parse().unwrap_or_default(),
        })
        .collect();

    Ok(rooms)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn envelope(code: i64, body: &str, message: &str) -> String {
        serde_json::to_string(&serde_json::json!({
            "code_": code,
            "sign": "",
            "result_": "true",
            "body": body,
            "message_": message,
        }))
        .unwrap()
    }

    #[test]
    fn parses_rooms_from_nested_body() {
        let body = r#"{"result":"ok","roomfullname":"南苑1栋101","detaillist":[{"use":"12.3","odd":"42.50","businesstype":"2","status":"1"}]}"#;
        let rooms = parse_response(&envelope(0, body, "")).unwrap();
        assert_eq!(
            rooms,
            vec![RoomInfo {
                room_name: "南苑1栋101".to_string(),
                balance: 42.5,
            }]
        );
    }

    #[test]
    fn empty_detail_list_yields_no_rooms() {
        let body = r#"{"roomfullname":"南苑1栋101","detaillist":[]}"#;
        let rooms = parse_response(&envelope(0, body, "")).unwrap();
        assert!(rooms.is_empty());
    }

    #[test]
    fn non_zero_code_is_an_api_error() {
        let err = parse_response(&envelope(500, "", "账号不存在")).unwrap_err();
        match err {
            WanxiaoError::Api(message) => assert_eq!(message, "账号不存在"),
            other => panic!("expected api error, got {other:?}"),
        }
    }

    #[test]
    fn garbage_payload_is_a_decode_error() {
        assert!(matches!(
            parse_response("not json"),
            Err(WanxiaoError::Payload(_))
        ));
        // Valid envelope, broken inner body.
        assert!(matches!(
            parse_response(&envelope(0, "not json", "")),
            Err(WanxiaoError::Payload(_))
        ));
    }

    #[test]
    fn malformed_balance_reads_as_zero() {
        let body = r#"{"roomfullname":"南苑1栋101","detaillist":[{"odd":""}]}"#;
        let rooms = parse_response(&envelope(0, body, "")).unwrap();
        assert_eq!(rooms[0].balance, 0.0);
    }
}
