//! End-to-end flows through the session store and the actor tasks.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{sleep, timeout};

use diceroyale_core::config::ContestConfig;
use diceroyale_core::event::{ChatKind, ServerEvent};
use diceroyale_core::identity::{ConnId, PlayerId, PlayerIdentity};
use diceroyale_core::money::Coins;
use diceroyale_core::session::SessionKey;
use diceroyale_server::store::SessionStore;

const WAIT: Duration = Duration::from_secs(10);

fn identity(n: u32) -> PlayerIdentity {
    PlayerIdentity {
        id: PlayerId::new(format!("u-{n}")),
        display_name: format!("Player{n}"),
    }
}

async fn recv(rx: &mut mpsc::Receiver<ServerEvent>) -> ServerEvent {
    timeout(WAIT, rx.recv())
        .await
        .expect("timed out waiting for event")
        .expect("event channel closed")
}

async fn recv_until(rx: &mut mpsc::Receiver<ServerEvent>, label: &str) -> ServerEvent {
    loop {
        let event = recv(rx).await;
        if event.label() == label {
            return event;
        }
    }
}

#[tokio::test]
async fn lobby_join_chat_leave_lifecycle() {
    let store = Arc::new(SessionStore::new(ContestConfig::default()));
    let key = SessionKey::parse("casino-1").unwrap();

    let lobby = store.lobby(&key);
    let (tx1, mut rx1) = mpsc::channel(256);
    let conn1 = ConnId::new_id();
    lobby.join(conn1, identity(1), tx1).await;

    // The join sequence arrives in its fixed order.
    assert_eq!(recv(&mut rx1).await.label(), "contestStartedChanged");
    assert_eq!(recv(&mut rx1).await.label(), "playerJoined");
    let roster = recv(&mut rx1).await;
    match &roster {
        ServerEvent::RosterUpdated { roster } => {
            assert_eq!(roster.len(), 1);
            assert!(roster[0].is_captain);
        }
        other => panic!("expected rosterUpdated, got {other}"),
    }
    assert_eq!(recv(&mut rx1).await.label(), "chatHistory");

    let (tx2, mut rx2) = mpsc::channel(256);
    let conn2 = ConnId::new_id();
    lobby.join(conn2, identity(2), tx2).await;
    recv_until(&mut rx2, "chatHistory").await;
    // The first member sees the second join land before the chat below.
    recv_until(&mut rx1, "chatHistory").await;

    lobby.send_chat(conn2, "glhf".to_string()).await;
    let history = recv_until(&mut rx1, "chatHistory").await;
    match history {
        ServerEvent::ChatHistory { messages } => {
            let user = messages
                .iter()
                .find(|m| m.kind == ChatKind::User)
                .expect("user chat message missing");
            assert_eq!(user.text, "glhf");
            assert_eq!(user.sender, "Player2");
        }
        other => panic!("expected chatHistory, got {other}"),
    }

    // Both leave; the deserted lobby actor stops and the sweep drops it.
    lobby.leave(conn1).await;
    lobby.leave(conn2).await;

    let mut stopped = false;
    for _ in 0..200 {
        if lobby.is_closed() {
            stopped = true;
            break;
        }
        sleep(Duration::from_millis(10)).await;
    }
    assert!(stopped, "deserted lobby actor kept running");

    store.sweep();
    assert_eq!(store.lobby_count(), 0);

    // A later join gets a fresh lobby with an empty chat history.
    let fresh = store.lobby(&key);
    let (tx3, mut rx3) = mpsc::channel(256);
    fresh.join(ConnId::new_id(), identity(3), tx3).await;
    let history = recv_until(&mut rx3, "chatHistory").await;
    match history {
        ServerEvent::ChatHistory { messages } => {
            assert!(messages.iter().all(|m| m.kind == ChatKind::System));
            assert!(messages.iter().all(|m| !m.text.contains("glhf")));
        }
        other => panic!("expected chatHistory, got {other}"),
    }
}

#[tokio::test]
async fn contest_runs_to_completion() {
    let config = ContestConfig {
        min_players: 2,
        max_players: 4,
        total_rounds: 2,
        round_deadline_secs: 5,
        inter_round_display_secs: 1,
        countdown_secs: 1,
        commission_rate: 0.10,
    };
    let store = Arc::new(SessionStore::new(config));
    let key = SessionKey::parse("contest-9").unwrap();

    let contest = store.contest(&key);
    let (tx_a, mut rx_a) = mpsc::channel(256);
    let (tx_b, mut rx_b) = mpsc::channel(256);
    let a = identity(1);
    let b = identity(2);

    contest
        .register(a.clone(), Coins::new(100), tx_a)
        .await
        .unwrap();
    contest
        .register(b.clone(), Coins::new(100), tx_b)
        .await
        .unwrap();
    contest.set_ready(a.id.clone()).await;
    contest.set_ready(b.id.clone()).await;

    for _ in 0..2 {
        recv_until(&mut rx_a, "roundStarted").await;
        contest.submit_roll(a.id.clone()).await;
        contest.submit_roll(b.id.clone()).await;
        recv_until(&mut rx_a, "roundLeaderboard").await;
    }

    let complete_a = recv_until(&mut rx_a, "contestComplete").await;
    let complete_b = recv_until(&mut rx_b, "contestComplete").await;

    let mut paid = 0u32;
    for event in [complete_a, complete_b] {
        match event {
            ServerEvent::ContestComplete {
                rank,
                payout,
                leaderboard,
                ..
            } => {
                assert!(rank == 1 || rank == 2);
                assert_eq!(leaderboard.len(), 2);
                paid += payout.amount();
            }
            other => panic!("expected contestComplete, got {other}"),
        }
    }
    // Two stakes of 100 at 10% commission leave 180 to distribute, and
    // heads-up pays out the whole distributable pool.
    assert_eq!(paid, 180);
}

#[tokio::test]
async fn stake_mismatch_rejected_via_actor() {
    let store = Arc::new(SessionStore::new(ContestConfig::default()));
    let key = SessionKey::parse("contest-5").unwrap();
    let contest = store.contest(&key);

    let (tx_a, _rx_a) = mpsc::channel(8);
    let (tx_b, _rx_b) = mpsc::channel(8);
    contest
        .register(identity(1), Coins::new(100), tx_a)
        .await
        .unwrap();
    let err = contest
        .register(identity(2), Coins::new(250), tx_b)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("does not match"));
}
