//! Rate limit aware retries for alloy's
//! [RetryBackoffLayer](alloy_transport::layers::RetryBackoffLayer).
use alloy_json_rpc::ErrorPayload;
use alloy_transport::{TransportError, TransportErrorKind, layers::RetryPolicy};
use serde::Deserialize;
use std::time::Duration;

/// Implements [RetryPolicy] that will retry requests that errored with
/// status code 429 i.e. TOO_MANY_REQUESTS, or with a server error.
///
/// Infura often fails with a `"header not found"` rpc error which is apparently linked to load
/// balancing, which are retried as well.
#[derive(Clone, Copy, Debug, Default)]
pub struct RateLimitRetryPolicy;

impl RetryPolicy for RateLimitRetryPolicy {
    fn backoff_hint(&self, error: &TransportError) -> Option<Duration> {
        if let TransportError::ErrorResp(resp) = error
            && let Some(Ok(data)) = resp.try_data_as::<serde_json::Value>()
        {
            // if daily rate limit exceeded, infura returns the requested backoff in the error
            // response
            let backoff_seconds = &data["rate"]["backoff_seconds"];
            if let Some(seconds) = backoff_seconds.as_u64() {
                return Some(Duration::from_secs(seconds));
            }
            if let Some(seconds) = backoff_seconds.as_f64() {
                return Some(Duration::from_secs(seconds as u64 + 1));
            }
        }
        None
    }

    fn should_retry(&self, error: &TransportError) -> bool {
        match error {
            TransportError::Transport(TransportErrorKind::HttpError(err)) => {
                err.status == 429 || (500..600).contains(&err.status)
            }
            TransportError::Transport(_) => true,
            TransportError::DeserError { text, .. } => {
                // some providers send invalid JSON RPC in the error case (no `id:u64`), but the
                // text should be a `JsonRpcError`
                #[derive(Deserialize)]
                struct Resp {
                    error: ErrorPayload,
                }

                if let Ok(resp) = serde_json::from_str::<Resp>(text) {
                    return should_retry_json_rpc_error(&resp.error);
                }
                false
            }
            TransportError::ErrorResp(err) => should_retry_json_rpc_error(err),
            // The request itself is broken, asking again won't help.
            _ => false,
        }
    }
}

/// Analyzes the [ErrorPayload] and decides if the request should be retried based on the
/// error code or the message.
pub fn should_retry_json_rpc_error(error: &ErrorPayload) -> bool {
    let ErrorPayload { code, message, .. } = error;
    // alchemy throws it this way
    if *code == 429 {
        return true;
    }

    // This is an infura error code for `exceeded project rate limit`
    if *code == -32005 {
        return true;
    }

    // alternative alchemy error for specific IPs
    if *code == -32016 && message.contains("rate limit") {
        return true;
    }

    match &**message {
        // load balancer issue on infura
        "header not found" => true,
        // also thrown by infura if out of budget for the day and ratelimited
        "daily request count exceeded, request rate limited" => true,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, value::to_raw_value};

    fn payload(code: i64, message: &str) -> TransportError {
        let message = message.to_string().into();
        TransportError::ErrorResp(ErrorPayload { code, message, data: None })
    }

    #[test]
    fn retries_rate_limits() {
        let policy = RateLimitRetryPolicy;
        assert!(policy.should_retry(&payload(429, "too many requests")));
        assert!(policy.should_retry(&payload(-32005, "limit exceeded")));
        assert!(policy.should_retry(&payload(-32016, "your IP has hit the rate limit")));
        assert!(policy.should_retry(&payload(-32000, "header not found")));
        assert!(!policy.should_retry(&payload(-32000, "nonce too low")));
        assert!(!policy.should_retry(&payload(-32016, "something else")));
    }

    #[test]
    fn retries_throttled_http() {
        let policy = RateLimitRetryPolicy;
        assert!(policy.should_retry(&TransportErrorKind::http_error(429, String::new())));
        assert!(policy.should_retry(&TransportErrorKind::http_error(503, String::new())));
        assert!(!policy.should_retry(&TransportErrorKind::http_error(401, String::new())));

        let err = serde_json::from_str::<u64>("nope").unwrap_err();
        let text = r#"{"error":{"code":-32005,"message":"limit exceeded"}}"#;
        assert!(policy.should_retry(&TransportError::deser_err(err, text)));
    }

    #[test]
    fn reads_backoff_hint() {
        let policy = RateLimitRetryPolicy;
        let err = TransportError::ErrorResp(ErrorPayload {
            code: -32005,
            message: "daily request count exceeded, request rate limited".into(),
            data: Some(to_raw_value(&json!({ "rate": { "backoff_seconds": 2.5 } })).unwrap()),
        });
        assert_eq!(policy.backoff_hint(&err), Some(Duration::from_secs(3)));
        assert_eq!(policy.backoff_hint(&payload(-32005, "x")), None);
    }
}
