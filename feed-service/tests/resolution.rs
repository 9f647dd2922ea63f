use async_trait::async_trait;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tweetfeed_core::{
    Account, CoreError, ManualClock, OwnedList, RateLimitsConfig, TargetSelector, TwitterApiError,
};
use twitter_client::{Endpoint, MockCall, MockTwitterApi, RateBudget};

use feed_service::{ManualSleeper, Pacer, Sleeper, TargetResolver};

fn pacer(limits: RateLimitsConfig) -> (Pacer, ManualSleeper, watch::Sender<bool>) {
    let clock = ManualClock::default();
    let sleeper = ManualSleeper::new(clock.clone());
    let (tx, rx) = watch::channel(false);
    let pacer = Pacer::new(
        RateBudget::new(&limits, Arc::new(clock)),
        Arc::new(sleeper.clone()),
        rx,
    );
    (pacer, sleeper, tx)
}

fn accounts(ids: &[&str]) -> Vec<Account> {
    ids.iter().map(|id| Account::from_id(*id)).collect()
}

fn csv_file(contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

#[tokio::test]
async fn test_followees_across_pages_without_duplicates() {
    let api = Arc::new(MockTwitterApi::new().with_followees(
        "42",
        vec![accounts(&["1", "2", "3"]), accounts(&["3", "4", "1"])],
    ));
    let (mut pacer, _sleeper, _tx) = pacer(RateLimitsConfig::default());
    let resolver = TargetResolver::new(api.clone(), None);

    let targets = resolver
        .resolve(&TargetSelector::AccountId("42".to_string()), &mut pacer)
        .await
        .unwrap();

    assert_eq!(targets.ids(), vec!["1", "2", "3", "4"]);
    assert_eq!(api.call_count(Endpoint::Followees), 2);
    assert_eq!(pacer.status(Endpoint::Followees).calls_used, 2);
}

#[tokio::test]
async fn test_followee_pages_respect_the_budget() {
    let api = Arc::new(MockTwitterApi::new().with_followees(
        "42",
        vec![accounts(&["1"]), accounts(&["2"]), accounts(&["3"])],
    ));
    let (mut pacer, sleeper, _tx) = pacer(RateLimitsConfig {
        followees_per_window: 1,
        ..Default::default()
    });

    let targets = TargetResolver::new(api, None)
        .resolve(&TargetSelector::AccountId("42".to_string()), &mut pacer)
        .await
        .unwrap();

    assert_eq!(targets.len(), 3);
    assert_eq!(
        sleeper.sleeps(),
        vec![Duration::from_secs(900), Duration::from_secs(900)]
    );
}

#[tokio::test]
async fn test_unknown_account_is_a_resolution_error() {
    let api = Arc::new(MockTwitterApi::new());
    let (mut pacer, _sleeper, _tx) = pacer(RateLimitsConfig::default());

    let result = TargetResolver::new(api.clone(), None)
        .resolve(&TargetSelector::AccountId("404".to_string()), &mut pacer)
        .await;

    match result {
        Err(CoreError::Resolution { selector, .. }) => {
            assert_eq!(selector, "user_id_for_followees=404");
        }
        other => panic!("Expected Resolution error, got {:?}", other),
    }
    // Permanent failures are not retried.
    assert_eq!(api.call_count(Endpoint::Followees), 1);
}

#[tokio::test]
async fn test_list_name_scans_owned_lists() {
    let api = Arc::new(
        MockTwitterApi::new()
            .with_owned_lists(
                "7",
                vec![
                    vec![OwnedList {
                        id: "100".to_string(),
                        name: "Rust".to_string(),
                    }],
                    vec![
                        OwnedList {
                            id: "200".to_string(),
                            name: "rust".to_string(),
                        },
                        OwnedList {
                            id: "300".to_string(),
                            name: "rust".to_string(),
                        },
                    ],
                ],
            )
            .with_list_members("200", vec![accounts(&["5", "6"])]),
    );
    let (mut pacer, _sleeper, _tx) = pacer(RateLimitsConfig::default());

    let targets = TargetResolver::new(api.clone(), Some("7".to_string()))
        .resolve(&TargetSelector::ListName("rust".to_string()), &mut pacer)
        .await
        .unwrap();

    assert_eq!(targets.ids(), vec!["5", "6"]);
    assert_eq!(
        api.calls().last(),
        Some(&MockCall::ListMembers {
            list_id: "200".to_string(),
            page_token: None,
        })
    );
}

#[tokio::test]
async fn test_list_name_needs_owner() {
    let api = Arc::new(MockTwitterApi::new());
    let (mut pacer, _sleeper, _tx) = pacer(RateLimitsConfig::default());

    let result = TargetResolver::new(api, None)
        .resolve(&TargetSelector::ListName("rust".to_string()), &mut pacer)
        .await;

    match result {
        Err(CoreError::Resolution { selector, reason }) => {
            assert_eq!(selector, "list_name=rust");
            assert!(reason.contains("api.owner_user_id"));
        }
        other => panic!("Expected Resolution error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_missing_list_name() {
    let api = Arc::new(MockTwitterApi::new().with_owned_lists(
        "7",
        vec![vec![OwnedList {
            id: "1".to_string(),
            name: "golang".to_string(),
        }]],
    ));
    let (mut pacer, _sleeper, _tx) = pacer(RateLimitsConfig::default());

    let result = TargetResolver::new(api, Some("7".to_string()))
        .resolve(&TargetSelector::ListName("rust".to_string()), &mut pacer)
        .await;

    assert!(matches!(result, Err(CoreError::Resolution { .. })));
}

#[tokio::test]
async fn test_file_with_header_yields_rows_in_order() {
    let file = csv_file("user_id,user_name\n30,Carol\n10,Alice\n40\n20,Bob\n");
    let api = Arc::new(MockTwitterApi::new());
    let (mut pacer, _sleeper, _tx) = pacer(RateLimitsConfig::default());

    let targets = TargetResolver::new(api.clone(), None)
        .with_header_line(1)
        .resolve(
            &TargetSelector::FilePath(file.path().display().to_string()),
            &mut pacer,
        )
        .await
        .unwrap();

    assert_eq!(targets.ids(), vec!["30", "10", "40", "20"]);
    assert_eq!(targets.get(0).unwrap().display_name, "Carol");
    assert_eq!(targets.get(2).unwrap().display_name, "40");
    // Numeric ids need no lookups.
    assert!(api.calls().is_empty());
}

#[tokio::test]
async fn test_file_handles_are_looked_up() {
    let file = csv_file("@TwitterDev\n2244994945\nnobody_here\nTwitterAPI\ntwitterdev\n");
    let api = Arc::new(
        MockTwitterApi::new()
            .with_user(Account::new("2244994945", "Twitter Dev").with_username("TwitterDev"))
            .with_user(Account::new("6253282", "Twitter API").with_username("TwitterAPI")),
    );
    let (mut pacer, _sleeper, _tx) = pacer(RateLimitsConfig::default());

    let targets = TargetResolver::new(api.clone(), None)
        .with_header_line(0)
        .resolve(
            &TargetSelector::FilePath(file.path().display().to_string()),
            &mut pacer,
        )
        .await
        .unwrap();

    // Unknown handles are skipped and the repeated account is kept once.
    assert_eq!(targets.ids(), vec!["2244994945", "6253282"]);
    assert_eq!(targets.get(0).unwrap().display_name, "Twitter Dev");
    assert_eq!(api.call_count(Endpoint::UsersLookup), 1);
}

#[tokio::test]
async fn test_transient_failures_are_retried_until_success() {
    let api = Arc::new(MockTwitterApi::new().with_followees("42", vec![accounts(&["1", "2"])]));
    for _ in 0..3 {
        api.fail_next(
            Endpoint::Followees,
            TwitterApiError::ServerError { status_code: 503 },
        );
    }
    let (mut pacer, sleeper, _tx) = pacer(RateLimitsConfig::default());

    let targets = TargetResolver::new(api.clone(), None)
        .resolve(&TargetSelector::AccountId("42".to_string()), &mut pacer)
        .await
        .unwrap();

    assert_eq!(targets.ids(), vec!["1", "2"]);
    assert_eq!(api.call_count(Endpoint::Followees), 4);
    assert_eq!(
        sleeper.sleeps(),
        vec![
            Duration::from_secs(2),
            Duration::from_secs(4),
            Duration::from_secs(8)
        ]
    );
}

#[tokio::test]
async fn test_rate_limited_page_waits_for_the_window() {
    let api = Arc::new(MockTwitterApi::new().with_list_members(
        "84839422",
        vec![accounts(&["1"]), accounts(&["2"])],
    ));
    api.fail_next(
        Endpoint::ListMembers,
        TwitterApiError::RateLimitExceeded { retry_after: 300 },
    );
    let (mut pacer, sleeper, _tx) = pacer(RateLimitsConfig::default());

    let targets = TargetResolver::new(api.clone(), None)
        .resolve(&TargetSelector::ListId("84839422".to_string()), &mut pacer)
        .await
        .unwrap();

    assert_eq!(targets.ids(), vec!["1", "2"]);
    assert_eq!(sleeper.sleeps(), vec![Duration::from_secs(300)]);
    assert_eq!(api.call_count(Endpoint::ListMembers), 3);
    assert_eq!(pacer.status(Endpoint::ListMembers).calls_used, 3);
}

#[tokio::test]
async fn test_lookup_and_owned_list_failures_recover() {
    let file = csv_file("@TwitterDev\n");
    let api = Arc::new(
        MockTwitterApi::new()
            .with_user(Account::new("2244994945", "Twitter Dev").with_username("TwitterDev")),
    );
    api.fail_next(Endpoint::UsersLookup, TwitterApiError::RequestTimeout);
    let (mut pacer, sleeper, _tx) = pacer(RateLimitsConfig::default());

    let targets = TargetResolver::new(api.clone(), None)
        .with_header_line(0)
        .resolve(
            &TargetSelector::FilePath(file.path().display().to_string()),
            &mut pacer,
        )
        .await
        .unwrap();
    assert_eq!(targets.ids(), vec!["2244994945"]);
    assert_eq!(sleeper.sleeps(), vec![Duration::from_secs(2)]);

    let api = Arc::new(
        MockTwitterApi::new()
            .with_owned_lists(
                "7",
                vec![vec![OwnedList {
                    id: "200".to_string(),
                    name: "rust".to_string(),
                }]],
            )
            .with_list_members("200", vec![accounts(&["5"])]),
    );
    api.fail_next(
        Endpoint::OwnedLists,
        TwitterApiError::ServerError { status_code: 500 },
    );
    let (mut pacer, _sleeper, _tx) = self::pacer(RateLimitsConfig::default());

    let targets = TargetResolver::new(api.clone(), Some("7".to_string()))
        .resolve(&TargetSelector::ListName("rust".to_string()), &mut pacer)
        .await
        .unwrap();
    assert_eq!(targets.ids(), vec!["5"]);
    assert_eq!(api.call_count(Endpoint::OwnedLists), 2);
}

#[tokio::test]
async fn test_permanent_failure_mid_pagination_names_the_selector() {
    let api = Arc::new(MockTwitterApi::new().with_list_members(
        "84839422",
        vec![accounts(&["1"]), accounts(&["2"])],
    ));
    let (mut pacer, _sleeper, _tx) = pacer(RateLimitsConfig::default());
    api.fail_next(
        Endpoint::ListMembers,
        TwitterApiError::Forbidden {
            resource: "/2/lists/84839422/members".to_string(),
        },
    );

    let result = TargetResolver::new(api.clone(), None)
        .resolve(&TargetSelector::ListId("84839422".to_string()), &mut pacer)
        .await;

    match result {
        Err(CoreError::Resolution { selector, reason }) => {
            assert_eq!(selector, "list_id=84839422");
            assert!(reason.contains("Forbidden"));
        }
        other => panic!("Expected Resolution error, got {:?}", other),
    }
    assert_eq!(api.call_count(Endpoint::ListMembers), 1);
}

/// Asks for shutdown as soon as a sleep starts, then never wakes on its own.
struct ShutdownOnSleep {
    shutdown: watch::Sender<bool>,
}

#[async_trait]
impl Sleeper for ShutdownOnSleep {
    async fn sleep(&self, _duration: Duration) {
        let _ = self.shutdown.send(true);
        std::future::pending::<()>().await;
    }
}

#[tokio::test]
async fn test_shutdown_during_backoff_stops_resolution() {
    let api = Arc::new(MockTwitterApi::new().with_followees("42", vec![accounts(&["1"])]));
    api.fail_next(Endpoint::Followees, TwitterApiError::RequestTimeout);

    let (tx, rx) = watch::channel(false);
    let mut pacer = Pacer::new(
        RateBudget::new(
            &RateLimitsConfig::default(),
            Arc::new(ManualClock::default()),
        ),
        Arc::new(ShutdownOnSleep { shutdown: tx }),
        rx,
    );

    let result = TargetResolver::new(api.clone(), None)
        .resolve(&TargetSelector::AccountId("42".to_string()), &mut pacer)
        .await;

    assert!(matches!(result, Err(CoreError::Interrupted)));
    assert_eq!(api.call_count(Endpoint::Followees), 1);
}
