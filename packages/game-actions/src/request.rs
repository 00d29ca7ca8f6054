use game_core::models::game_session::PlayerColor;
use serde::{Deserialize, Serialize};

/// API Gateway proxy event. The authorizer has already resolved the caller.
#[derive(Debug, Deserialize)]
pub struct ActionEvent {
    #[serde(rename = "requestContext")]
    pub request_context: RequestContext,
    pub body: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RequestContext {
    pub authorizer: Option<Authorizer>,
}

#[derive(Debug, Deserialize)]
pub struct Authorizer {
    #[serde(rename = "principalId")]
    pub principal_id: String,
}

impl ActionEvent {
    pub fn player_id(&self) -> Option<&str> {
        self.request_context
            .authorizer
            .as_ref()
            .map(|a| a.principal_id.as_str())
            .filter(|id| !id.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Action {
    MakeMove {
        session_id: String,
        from: String,
        to: String,
        #[serde(default)]
        promotion: Option<String>,
    },
    Resign {
        session_id: String,
    },
    ClaimTimeout {
        session_id: String,
        color: PlayerColor,
    },
    PersistClock {
        session_id: String,
    },
    OfferDraw {
        session_id: String,
    },
    AcceptDraw {
        session_id: String,
    },
    DeclineDraw {
        session_id: String,
    },
    StartSession {
        room_id: String,
    },
    GetState {
        session_id: String,
    },
    LegalMoves {
        session_id: String,
        #[serde(default)]
        from: Option<String>,
    },
}

#[derive(Debug, Serialize)]
pub struct ActionResponse {
    #[serde(rename = "statusCode")]
    pub status_code: u16,
    pub body: String,
}

impl ActionResponse {
    pub fn new(status_code: u16, body: serde_json::Value) -> Self {
        ActionResponse {
            status_code,
            body: body.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_event_and_actions() {
        let event: ActionEvent = serde_json::from_str(
            r#"{
                "requestContext": {"authorizer": {"principalId": "player-1"}},
                "body": "{\"action\":\"make_move\",\"session_id\":\"s1\",\"from\":\"e7\",\"to\":\"e8\",\"promotion\":\"q\"}"
            }"#,
        )
        .unwrap();

        assert_eq!(event.player_id(), Some("player-1"));
        let action: Action = serde_json::from_str(event.body.as_deref().unwrap()).unwrap();
        assert_eq!(
            action,
            Action::MakeMove {
                session_id: "s1".to_string(),
                from: "e7".to_string(),
                to: "e8".to_string(),
                promotion: Some("q".to_string()),
            }
        );

        let action: Action =
            serde_json::from_str(r#"{"action":"claim_timeout","session_id":"s1","color":"black"}"#).unwrap();
        assert_eq!(
            action,
            Action::ClaimTimeout {
                session_id: "s1".to_string(),
                color: PlayerColor::Black,
            }
        );
    }

    #[test]
    fn test_missing_principal_is_anonymous() {
        let event: ActionEvent =
            serde_json::from_str(r#"{"requestContext": {}, "body": null}"#).unwrap();

        assert_eq!(event.player_id(), None);
    }

    #[test]
    fn test_response_shape() {
        let response = ActionResponse::new(409, serde_json::json!({"error": "wrong_turn"}));
        let json = serde_json::to_value(&response).unwrap();

        assert_eq!(json["statusCode"], 409);
        assert_eq!(json["body"], "{\"error\":\"wrong_turn\"}");
    }
}
