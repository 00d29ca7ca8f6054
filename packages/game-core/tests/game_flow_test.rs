mod common;

use common::{Harness, CREATOR, OPPONENT};
use game_core::change_feed::ChangeObserver;
use game_core::models::game_session::{EndReason, GameOutcome, GameStatus, PlayerColor};
use game_core::models::move_request::MoveRequest;
use game_core::models::room::RoomState;
use game_core::repositories::room_repository::RoomRepository;
use game_core::services::chess_service::ChessService;
use game_core::services::errors::game_session_service_errors::GameSessionServiceError;

const RUY_LOPEZ: [(&str, &str); 10] = [
    ("e2", "e4"),
    ("e7", "e5"),
    ("g1", "f3"),
    ("b8", "c6"),
    ("f1", "b5"),
    ("a7", "a6"),
    ("b5", "a4"),
    ("g8", "f6"),
    ("e1", "g1"),
    ("f8", "e7"),
];

#[tokio::test]
async fn test_start_session_assigns_both_players() {
    let h = Harness::new().await;

    let session = h.start_game(10).await;

    let mut players = vec![session.white_player_id.clone(), session.black_player_id.clone()];
    players.sort();
    assert_eq!(players, vec![CREATOR.to_string(), OPPONENT.to_string()]);
    assert_eq!(session.bet_amount, 10);
    assert_eq!(session.time_left_ms(PlayerColor::White), 600_000);
    assert_eq!(session.time_left_ms(PlayerColor::Black), 600_000);

    let room = h.rooms.get_room(&session.room_id).await.unwrap().unwrap();
    assert_eq!(room.state, RoomState::InGame);

    let again = h.games.start_session(&session.room_id, OPPONENT).await.unwrap();
    assert_eq!(again.id, session.id);
}

#[tokio::test]
async fn test_move_log_is_gapless_and_replays_to_board() -> anyhow::Result<()> {
    let h = Harness::new().await;
    let mut session = h.start_game(10).await;
    let chess = ChessService::new();
    let mut replay = chess.load(&session.board_state)?;

    for (ply, (from, to)) in RUY_LOPEZ.iter().enumerate() {
        let mover_color = session.current_player;
        let mover = session.player_id(mover_color).to_string();

        session = h.play(&session, &mover, from, to).await?;

        assert_eq!(session.current_player, mover_color.opponent());
        assert_eq!(session.move_count as usize, ply + 1);
        replay = chess.apply_move(&replay, from, to, None)?.0;
        assert_eq!(session.board_state, replay.fen());
    }

    let moves = h.games.list_moves(&session.id).await?;
    let numbers: Vec<u32> = moves.iter().map(|m| m.move_number).collect();
    assert_eq!(numbers, (1..=10).collect::<Vec<_>>());
    assert_eq!(moves.last().map(|m| m.fen_after.as_str()), Some(session.board_state.as_str()));
    Ok(())
}

#[tokio::test]
async fn test_wrong_turn_and_illegal_moves_leave_record_untouched() {
    let h = Harness::new().await;
    let session = h.start_game(10).await;
    let black = session.black_player_id.clone();
    let white = session.white_player_id.clone();

    assert_eq!(
        h.play(&session, &black, "e7", "e5").await,
        Err(GameSessionServiceError::WrongTurn)
    );
    assert!(matches!(
        h.play(&session, &white, "e1", "e3").await,
        Err(GameSessionServiceError::IllegalMove(_))
    ));

    let stored = h.games.get_session(&session.id).await.unwrap();
    assert_eq!(stored.board_state, session.board_state);
    assert_eq!(stored.version, session.version);
    assert_eq!(stored.time_left_ms(PlayerColor::White), 600_000);
    assert!(h.games.list_moves(&session.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_resignation_ignores_material() {
    let h = Harness::new().await;
    let session = h.start_game(10).await;
    let white = session.white_player_id.clone();
    let black = session.black_player_id.clone();

    // White wins a pawn, then resigns anyway.
    let session = h.play(&session, &white, "e2", "e4").await.unwrap();
    let session = h.play(&session, &black, "d7", "d5").await.unwrap();
    let session = h.play(&session, &white, "e4", "d5").await.unwrap();

    let resigned = h.games.resign(&session.id, &white).await.unwrap();
    let again = h.games.resign(&session.id, &white).await.unwrap();

    assert_eq!(resigned.state, GameStatus::Completed);
    assert_eq!(resigned.winner, Some(GameOutcome::Black));
    assert_eq!(resigned.end_reason, Some(EndReason::Resignation));
    assert_eq!(again, resigned);
}

#[tokio::test]
async fn test_flagged_player_cannot_move() {
    let h = Harness::new().await;
    let session = h.start_game(10).await;
    let white = session.white_player_id.clone();
    let black = session.black_player_id.clone();
    let session = h.play(&session, &white, "e2", "e4").await.unwrap();

    h.time.advance_ms(600_000);
    let result = h
        .games
        .make_move(&black, &MoveRequest::new(&session.id, "e7", "e5"))
        .await;

    assert_eq!(
        result,
        Err(GameSessionServiceError::TimeExpired {
            outcome: GameOutcome::White
        })
    );
    let stored = h.games.get_session(&session.id).await.unwrap();
    assert_eq!(stored.state, GameStatus::Completed);
    assert_eq!(stored.winner, Some(GameOutcome::White));
    assert_eq!(stored.end_reason, Some(EndReason::Timeout));
    assert_eq!(stored.move_count, 1);
}

#[tokio::test]
async fn test_clock_survives_a_restart() {
    let h = Harness::new().await;
    let session = h.start_game(10).await;
    let white = session.white_player_id.clone();

    h.time.advance_ms(5_000);
    h.games.persist_clock_tick(&session.id).await.unwrap();
    h.time.advance_ms(5_000);
    h.games.persist_clock_tick(&session.id).await.unwrap();
    h.time.advance_ms(1_000);

    // A fresh reader computes the same remaining time from the record.
    let stored = h.games.get_session(&session.id).await.unwrap();
    let view = h.games.clock_view(&stored);
    assert_eq!(view.white_ms, 589_000);
    assert_eq!(view.black_ms, 600_000);

    let moved = h.play(&stored, &white, "e2", "e4").await.unwrap();
    assert_eq!(moved.time_left_ms(PlayerColor::White), 587_000);
}

#[tokio::test(start_paused = true)]
async fn test_polling_sees_room_and_session_after_start() {
    let h = Harness::new().await;
    let session = h.start_game(10).await;

    let mut room_poll = h.games.poll_room(&session.room_id);
    let room = room_poll.next_change().await.unwrap();
    assert_eq!(room.state, RoomState::InGame);
    assert_eq!(room.version, 1);

    let mut session_poll = h.games.poll_session(&session.id);
    assert_eq!(session_poll.next_change().await.unwrap(), session);
}
