//! Performance benchmarks for rating calculations and settlement

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use rally_ledger::commands::CommandRouter;
use rally_ledger::config::RatingSettings;
use rally_ledger::directory::PlayerDirectory;
use rally_ledger::metrics::MetricsCollector;
use rally_ledger::rating::{elo, MarginEloCalculator, RatingCalculator};
use rally_ledger::service::Ledger;
use rally_ledger::types::{
    Command, CommandRequest, NotificationKind, Position, ScoreLine, TransportId,
};
use std::sync::Arc;

fn request(actor: TransportId, command: Command) -> CommandRequest {
    CommandRequest {
        actor,
        username: None,
        command,
        timestamp: chrono::Utc::now(),
    }
}

/// Router over a fresh ledger with two registered players
async fn create_bench_system() -> (Arc<CommandRouter>, String) {
    let metrics = Arc::new(MetricsCollector::new().unwrap());
    let ledger = Ledger::new(&RatingSettings::default(), metrics).unwrap();
    let router = ledger.router();

    for (actor, name) in [(1, "Ann"), (2, "Bob")] {
        router
            .dispatch(&request(
                actor,
                Command::Register {
                    name: name.to_string(),
                    surname: "Bench".to_string(),
                    position: Position::Student,
                },
            ))
            .await;
    }

    let opponent_index = ledger
        .directory()
        .get_by_transport_id(2)
        .await
        .unwrap()
        .unwrap()
        .public_index
        .as_str()
        .to_string();

    (router, opponent_index)
}

fn bench_rating_calculations(c: &mut Criterion) {
    let pairs = [
        (1500, 1500, 3, 1),
        (1600, 1500, 2, 2),
        (1450, 1700, 11, 9),
        (2100, 900, 0, 21),
    ];

    c.bench_function("elo_update_4_results", |b| {
        b.iter(|| {
            for (rating_a, rating_b, score_a, score_b) in pairs {
                black_box(elo::update(
                    black_box(rating_a),
                    black_box(rating_b),
                    score_a,
                    score_b,
                    32.0,
                ))
                .unwrap();
            }
        })
    });

    let calculator = MarginEloCalculator::default();
    c.bench_function("calculator_settle", |b| {
        b.iter(|| {
            black_box(calculator.settle(
                (1, black_box(1600)),
                (2, black_box(1400)),
                ScoreLine::new(7, 5),
            ))
        })
    });
}

fn bench_report_and_confirm(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();

    c.bench_function("report_and_confirm", |b| {
        b.iter(|| {
            rt.block_on(async {
                let (router, opponent_index) = create_bench_system().await;

                let submitted = router
                    .dispatch(&request(
                        1,
                        Command::SubmitMatch {
                            opponent_index,
                            score: "3-1".to_string(),
                        },
                    ))
                    .await;
                let match_id = submitted[0].match_id.unwrap();

                let confirmed = router
                    .dispatch(&request(2, Command::ConfirmMatch { match_id }))
                    .await;
                assert_eq!(confirmed[0].kind, NotificationKind::MatchConfirmed);
                black_box(confirmed)
            })
        })
    });
}

fn bench_leaderboard(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let router = rt.block_on(async {
        let metrics = Arc::new(MetricsCollector::new().unwrap());
        let ledger = Ledger::new(&RatingSettings::default(), metrics).unwrap();
        let router = ledger.router();

        for actor in 0..200 {
            router
                .dispatch(&request(
                    actor,
                    Command::Register {
                        name: format!("Player{}", actor),
                        surname: "Bench".to_string(),
                        position: Position::Other,
                    },
                ))
                .await;
        }
        router
    });

    c.bench_function("leaderboard_200_players", |b| {
        b.iter(|| {
            rt.block_on(async { black_box(router.dispatch(&request(0, Command::AllStats)).await) })
        })
    });
}

criterion_group!(
    benches,
    bench_rating_calculations,
    bench_report_and_confirm,
    bench_leaderboard
);
criterion_main!(benches);
