// Wire protocol: framed JSON messages over the WebSocket transport.
//
// Every message carries a string `type` field. Client messages parse into
// `ClientMessage`; anything that fails to parse is answered with
// ERROR/INVALID_MESSAGE or ERROR/UNKNOWN_TYPE by the dispatcher.

use serde::{Deserialize, Serialize};

use crate::engine::fighter::FighterInput;
use crate::engine::sim::{Observation, SimEvent, SimSnapshot};
use crate::error::ErrorCode;
use crate::store::MatchRecord;
use crate::tournament::TournamentView;

/// WebSocket close code sent after a failed AUTH.
pub const CLOSE_AUTH_FAILED: u16 = 4001;
/// WebSocket close code sent on connection/auth rate-limit breaches.
pub const CLOSE_RATE_LIMITED: u16 = 4029;

/// Messages accepted from clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "type",
    rename_all = "SCREAMING_SNAKE_CASE",
    rename_all_fields = "camelCase"
)]
pub enum ClientMessage {
    Auth {
        api_key: String,
    },
    Ping,
    Input {
        input: FighterInput,
        frame_number: u64,
    },
    JoinMatchmaking,
    LeaveMatchmaking,
    Challenge {
        target_bot_id: String,
    },
    Spectate {
        match_id: String,
    },
    GetLeaderboard,
    GetMatches {
        #[serde(default)]
        bot_id: Option<String>,
        #[serde(default)]
        limit: Option<usize>,
    },
    RegisterBot {
        bot_name: String,
        owner_id: String,
    },
    CreateTournament {
        name: String,
        format: String,
        max_bots: usize,
        buy_in: i64,
        prize_distribution: Vec<f64>,
    },
    JoinTournament {
        tournament_id: String,
    },
    StartTournament {
        tournament_id: String,
    },
    GetBracket {
        tournament_id: String,
    },
    ListTournaments,
}

/// Opponent identity attached to MATCH_STARTING.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpponentInfo {
    pub bot_id: String,
    pub bot_name: String,
    pub rating: i32,
}

/// One leaderboard row, ordered by rating descending.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardEntry {
    pub rank: usize,
    pub bot_id: String,
    pub bot_name: String,
    pub rating: i32,
}

/// Final round score of a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalScore {
    pub p1_rounds: u32,
    pub p2_rounds: u32,
}

/// Messages sent to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "type",
    rename_all = "SCREAMING_SNAKE_CASE",
    rename_all_fields = "camelCase"
)]
pub enum ServerMessage {
    Welcome {
        requires_auth: bool,
    },
    AuthSuccess {
        bot_id: String,
        bot_name: String,
        rating: i32,
    },
    Error {
        code: ErrorCode,
        message: String,
    },
    Pong {
        timestamp: i64,
    },
    Observation {
        observation: Observation,
        requires_response: bool,
    },
    MatchState {
        state: SimSnapshot,
    },
    RoundStart {
        round_number: u32,
    },
    Damage {
        event: SimEvent,
    },
    Ko {
        event: SimEvent,
    },
    MatchStarting {
        match_id: String,
        opponent: OpponentInfo,
    },
    MatchEnd {
        match_id: String,
        winner_id: Option<String>,
        final_score: FinalScore,
    },
    MatchmakingJoined,
    MatchmakingLeft,
    SpectateJoined {
        match_id: String,
    },
    Leaderboard {
        bots: Vec<LeaderboardEntry>,
    },
    MatchHistory {
        matches: Vec<MatchRecord>,
    },
    BotRegistered {
        bot_id: String,
        api_key: String,
        bot_name: String,
        rating: i32,
    },
    TournamentCreated {
        tournament: TournamentView,
    },
    TournamentJoined {
        tournament_id: String,
    },
    TournamentStarted {
        tournament: TournamentView,
    },
    Bracket {
        tournament: TournamentView,
    },
    TournamentList {
        tournaments: Vec<TournamentView>,
    },
}

impl ServerMessage {
    pub fn error(err: &crate::error::ArenaError) -> Self {
        ServerMessage::Error {
            code: err.code(),
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_parses() {
        let msg: ClientMessage =
            serde_json::from_str(r#"{"type":"AUTH","apiKey":"arena_abc"}"#).unwrap();
        assert_eq!(
            msg,
            ClientMessage::Auth {
                api_key: "arena_abc".into()
            }
        );
    }

    #[test]
    fn test_input_parses_with_partial_booleans() {
        let msg: ClientMessage = serde_json::from_str(
            r#"{"type":"INPUT","input":{"right":true,"attack1":true},"frameNumber":12}"#,
        )
        .unwrap();
        match msg {
            ClientMessage::Input {
                input,
                frame_number,
            } => {
                assert!(input.right);
                assert!(input.attack1);
                assert!(!input.left);
                assert_eq!(frame_number, 12);
            }
            other => panic!("unexpected message {other:?}"),
        }
    }

    #[test]
    fn test_unknown_type_fails_to_parse() {
        let result = serde_json::from_str::<ClientMessage>(r#"{"type":"NOT_A_THING"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_create_tournament_parses() {
        let msg: ClientMessage = serde_json::from_str(
            r#"{"type":"CREATE_TOURNAMENT","name":"Friday Night","format":"single_elimination","maxBots":8,"buyIn":100,"prizeDistribution":[70,30]}"#,
        )
        .unwrap();
        match msg {
            ClientMessage::CreateTournament {
                max_bots,
                prize_distribution,
                ..
            } => {
                assert_eq!(max_bots, 8);
                assert_eq!(prize_distribution, vec![70.0, 30.0]);
            }
            other => panic!("unexpected message {other:?}"),
        }
    }

    #[test]
    fn test_server_messages_tagged() {
        let json = serde_json::to_string(&ServerMessage::Welcome {
            requires_auth: true,
        })
        .unwrap();
        assert!(json.contains("\"type\":\"WELCOME\""));
        assert!(json.contains("\"requiresAuth\":true"));

        let json = serde_json::to_string(&ServerMessage::MatchEnd {
            match_id: "m-1".into(),
            winner_id: Some("bot-a".into()),
            final_score: FinalScore {
                p1_rounds: 2,
                p2_rounds: 1,
            },
        })
        .unwrap();
        assert!(json.contains("\"type\":\"MATCH_END\""));
        assert!(json.contains("\"p1Rounds\":2"));
    }
}
