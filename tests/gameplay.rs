use assert_matches::assert_matches;
use checkers_server::{
    checkers::{PieceType, Player, Pos, Size, Team},
    events::EventData,
    protocol::names,
};
use common::{TestClient, TestServer};

mod common;

/// A piece of `player` with two simple moves in the initial setup, and its tiles
fn opening(player: Player) -> (Pos, [Pos; 2]) {
    match player {
        Player::Black => (Pos::new(1, 2), [Pos::new(0, 3), Pos::new(2, 3)]),
        Player::Red => (Pos::new(2, 5), [Pos::new(1, 4), Pos::new(3, 4)]),
    }
}

/// Connects two players and splits them into (mover, waiting)
async fn two_players(server: &TestServer) -> (TestClient, TestClient, Player) {
    let mut first = server.client().await.expect("Failed to connect client 1");
    let mut second = server.client().await.expect("Failed to connect client 2");
    let (first_team, turn) = first.start().await.expect("Client 1 did not start");
    let (second_team, second_turn) = second.start().await.expect("Client 2 did not start");
    assert_eq!(turn, second_turn);

    let player = Player::from_turn(turn);
    if first_team.controls(player) {
        assert!(!second_team.controls(player));
        (first, second, player)
    } else {
        assert!(second_team.controls(player));
        (second, first, player)
    }
}

#[tokio::test]
async fn test_start_protocol() {
    let server = TestServer::new().await.expect("Failed to start server");
    let mut red = server.client().await.expect("Failed to connect client 1");
    let mut black = server.client().await.expect("Failed to connect client 2");

    for (client, expected) in [(&mut red, Team::Red), (&mut black, Team::Black)] {
        // Check pieces
        let mut pieces = Vec::new();
        for _ in 0..24 {
            let event = client.recv().await.expect("Failed to receive piece");
            assert_eq!(event.name, names::CREATE_PIECE);
            assert_matches!(event.data, EventData::Piece { pos, piece } => pieces.push((pos, piece)));
        }
        let count = |kind: PieceType| pieces.iter().filter(|(_, piece)| *piece == kind).count();
        assert_eq!(count(PieceType::BlackPawn), 12);
        assert_eq!(count(PieceType::RedPawn), 12);

        // Check team, then configuration
        let event = client.recv().await.expect("Failed to receive team");
        assert_eq!(event.name, names::PLAYING_AS);
        assert_eq!(event.data, EventData::Team(expected));

        let event = client.recv().await.expect("Failed to receive configuration");
        assert_eq!(event.name, names::INITIAL_CONFIG);
        assert_matches!(event.data, EventData::InitialConfig { size, .. } if size == Size::default());
    }
}

#[tokio::test]
async fn test_wrong_turn_click_is_ignored() {
    let server = TestServer::new().await.expect("Failed to start server");
    let (mut mover, mut waiting, player) = two_players(&server).await;

    // Waiting player tries its own opening piece
    let (piece, _) = opening(player.opponent());
    waiting
        .click_piece(piece)
        .await
        .expect("Failed to send click");

    // Only the mover's selection reaches the waiting player
    let (piece, tiles) = opening(player);
    mover.click_piece(piece).await.expect("Failed to send click");
    for tile in tiles {
        let event = waiting.recv().await.expect("Failed to receive tile");
        assert_eq!(event.name, names::CREATE_TILE);
        assert_eq!(event.data, EventData::Position(tile));
    }
    let event = waiting.recv().await.expect("Failed to receive selection");
    assert_eq!(event.name, names::SELECT_PIECE);
    assert_eq!(
        event.data,
        EventData::Selection {
            pos: piece,
            selected: true
        }
    );
}

#[tokio::test]
async fn test_move_produces_animation_block() {
    let server = TestServer::new().await.expect("Failed to start server");
    let (mut mover, mut waiting, player) = two_players(&server).await;

    let (piece, tiles) = opening(player);
    mover.click_piece(piece).await.expect("Failed to send click");
    mover.click_tile(tiles[0]).await.expect("Failed to send click");

    for client in [&mut mover, &mut waiting] {
        let event = client
            .recv_until(names::ANIMATION_STATE)
            .await
            .expect("Failed to receive block start");
        assert_eq!(event.data, EventData::Flag(true));

        let mut block = Vec::new();
        loop {
            let event = client.recv().await.expect("Failed to receive block");
            if event.name == names::ANIMATION_STATE {
                assert_eq!(event.data, EventData::Flag(false));
                break;
            }
            block.push((event.name, event.data));
        }

        assert_eq!(
            block,
            vec![
                (
                    names::SELECT_PIECE.to_string(),
                    EventData::Selection {
                        pos: piece,
                        selected: false
                    }
                ),
                (names::DELETE_TILE.to_string(), EventData::Position(tiles[0])),
                (names::DELETE_TILE.to_string(), EventData::Position(tiles[1])),
                (
                    names::MOVE_PIECE_ANIMATION.to_string(),
                    EventData::Movement {
                        from: piece,
                        to: tiles[0]
                    }
                ),
                (
                    names::ACTION_COMPLETE.to_string(),
                    EventData::ActionComplete {
                        from: piece,
                        to: tiles[0],
                        turn: player.opponent().turn()
                    }
                ),
            ]
        );
    }

    // Turn passed: the former mover is now ignored
    let (piece, tiles) = opening(player.opponent());
    mover.click_piece(opening(player).0).await.expect("Failed to send click");
    waiting.click_piece(piece).await.expect("Failed to send click");
    let event = mover.recv().await.expect("Failed to receive tile");
    assert_eq!(event.name, names::CREATE_TILE);
    assert_eq!(event.data, EventData::Position(tiles[0]));
}
