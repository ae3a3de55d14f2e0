//! Façade behaviour against the in-memory backend

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use mailwatch_core::{
    CancellationToken, CheckKind, ClientConfig, Error, ExpectedTemplate, FakeScenario,
    NotificationClient, NotificationMessage, PersonSeed, Placeholders, PollPolicy, ProviderConfig,
    Role, WaitRequest,
};

const GIFT_SUBJECT: &str = "A special gift for {receiverFirstName}, from {giverFirstName}";

fn fake_client(poll: PollPolicy) -> NotificationClient {
    NotificationClient::new(ClientConfig::new(ProviderConfig::fake()).with_poll(poll)).unwrap()
}

fn gift_values() -> Placeholders {
    Placeholders::new()
        .with("receiverFirstName", "Jane")
        .with("giverFirstName", "John")
}

fn gift_scenario() -> FakeScenario {
    FakeScenario::new(
        "gift-receive",
        "\"Storybook Gifts\" <gifts@app.example.com>",
        GIFT_SUBJECT,
        "Hi {receiverFirstName}! Claim it at https://app.example.com/gift/g-1001",
    )
    .for_role(Role::Recipient)
    .with_placeholders(gift_values())
}

#[tokio::test]
async fn provisioned_addresses_are_unique_across_roles() {
    let client = fake_client(PollPolicy::default());
    let mut seen = HashSet::new();
    for round in 0..5 {
        for role in Role::ALL {
            let identity = client.provision_identity(role).await.unwrap();
            assert_eq!(identity.role(), role);
            assert!(
                seen.insert(identity.address().to_string()),
                "duplicate address {} in round {}",
                identity.address(),
                round
            );
        }
    }
    assert_eq!(client.identities().len(), 15);
}

#[tokio::test]
async fn gift_scenario_renders_and_validates() {
    // Default 30s interval: the fake must answer on the first poll
    let client = fake_client(PollPolicy::default());
    client.fake().unwrap().register_scenario(gift_scenario());

    let recipient = client.provision_identity(Role::Recipient).await.unwrap();
    let template = client.template("gift-receive").unwrap().clone();

    let start = Instant::now();
    let verified = client
        .wait_for_notification(&recipient, &template, &gift_values(), None)
        .await
        .unwrap();

    assert!(start.elapsed() < Duration::from_secs(1));
    assert_eq!(verified.attempts, 1);
    assert_eq!(verified.message.subject(), "A special gift for Jane, from John");
    assert!(verified.report.is_ok(), "{}", verified.report);

    let link = client.extract_link(&verified.message, "gift").unwrap();
    assert_eq!(link, "https://app.example.com/gift/g-1001");
    assert_eq!(client.extract_token(&verified.message, "gift").unwrap(), "g-1001");
}

#[tokio::test]
async fn never_matching_message_times_out_within_bounds() {
    let interval = Duration::from_millis(500);
    let client = fake_client(PollPolicy::new(interval, Duration::from_secs(30)));
    client.fake().unwrap().register_scenario(
        FakeScenario::new("other", "noreply@app.example.com", "Something else entirely", "")
            .for_role(Role::Generic),
    );

    let identity = client.provision_identity(Role::Generic).await.unwrap();
    let template = ExpectedTemplate::new("welcome", "Welcome, {firstName}!");
    let values = Placeholders::new().with("firstName", "Ada");

    let start = Instant::now();
    let err = client
        .wait_for_notification(&identity, &template, &values, Some(Duration::from_secs(2)))
        .await
        .unwrap_err();
    let elapsed = start.elapsed();

    assert!(matches!(err, Error::Timeout { .. }), "unexpected error: {err}");
    assert!(elapsed >= Duration::from_secs(2), "timed out early: {:?}", elapsed);
    assert!(elapsed <= Duration::from_secs(2) + interval, "timed out late: {:?}", elapsed);
    assert!(err.to_string().contains("welcome"));
}

#[tokio::test]
async fn content_mismatch_is_terminal_in_strict_mode() {
    let config = ClientConfig::new(ProviderConfig::fake())
        .with_poll(PollPolicy::new(Duration::from_millis(50), Duration::from_secs(5)))
        .with_strict(true);
    let client = NotificationClient::new(config).unwrap();
    let fake = client.fake().unwrap();
    fake.register_scenario(
        FakeScenario::new("gift-no-link", "gifts@app.example.com", GIFT_SUBJECT, "No link here")
            .for_role(Role::Recipient)
            .with_placeholders(gift_values()),
    );
    let recipient = client.provision_identity(Role::Recipient).await.unwrap();
    let template = client.template("gift-receive").unwrap().clone();

    let err = client
        .wait_for_notification(&recipient, &template, &gift_values(), None)
        .await
        .unwrap_err();
    match err {
        Error::ContentMismatch { report, address, .. } => {
            assert_eq!(address, recipient.address());
            assert!(report.failed(&CheckKind::Link("gift".into())));
        }
        other => panic!("unexpected error: {other}"),
    }
    // Matched on the first poll and was not retried
    assert_eq!(fake.fetch_count(), 1);
}

#[tokio::test]
async fn default_mode_returns_full_report() {
    let client = fake_client(PollPolicy::new(Duration::from_millis(50), Duration::from_secs(5)));
    client.fake().unwrap().register_scenario(
        FakeScenario::new("gift", "someone@else.test", GIFT_SUBJECT, "nothing")
            .for_role(Role::Recipient)
            .with_placeholders(gift_values()),
    );
    let recipient = client.provision_identity(Role::Recipient).await.unwrap();
    let template = client.template("gift-receive").unwrap().clone().sender("gifts@app.example.com");

    let verified = client
        .wait_for_notification(&recipient, &template, &gift_values(), None)
        .await
        .unwrap();
    assert_eq!(verified.report.failures.len(), 2);
    assert!(verified.report.failed(&CheckKind::Sender));
}

#[tokio::test]
async fn concurrent_waits_on_separate_identities() {
    let client = Arc::new(fake_client(PollPolicy::new(
        Duration::from_millis(50),
        Duration::from_secs(5),
    )));
    let giver = client.provision_identity(Role::Purchaser).await.unwrap();
    let receiver = client.provision_identity(Role::Recipient).await.unwrap();
    let giver_seed = PersonSeed::new(Role::Purchaser, "John", "Doe", giver.address());
    let receiver_seed = PersonSeed::new(Role::Recipient, "Jane", "Roe", receiver.address());
    let values = Placeholders::for_gift(&giver_seed, &receiver_seed);

    let gift = client.template("gift-receive").unwrap().clone();
    let opened = client.template("gift-opened").unwrap().clone();

    let delivering = {
        let client = Arc::clone(&client);
        let (giver, receiver) = (giver.clone(), receiver.clone());
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            let fake = client.fake().unwrap();
            fake.deliver(
                &receiver,
                NotificationMessage::new(
                    "gifts@app.example.com",
                    "A special gift for Jane, from John",
                    "https://app.example.com/gift/abc",
                ),
            );
            tokio::time::sleep(Duration::from_millis(100)).await;
            fake.deliver(
                &giver,
                NotificationMessage::new("gifts@app.example.com", "Jane opened your gift", ""),
            );
        })
    };

    let results = client
        .wait_all(&[
            WaitRequest::new(receiver.clone(), gift, values.clone()),
            WaitRequest::new(giver.clone(), opened, values),
        ])
        .await;
    delivering.await.unwrap();

    let received = results[0].as_ref().unwrap();
    let notified = results[1].as_ref().unwrap();
    assert_eq!(received.identity.address(), receiver.address());
    assert_eq!(notified.identity.address(), giver.address());
    assert_eq!(client.identity_for(Role::Purchaser), Some(giver));
}

#[tokio::test]
async fn cancel_all_aborts_in_flight_wait() {
    let client = Arc::new(fake_client(PollPolicy::new(
        Duration::from_secs(30),
        Duration::from_secs(600),
    )));
    let identity = client.provision_identity(Role::Generic).await.unwrap();
    let template = ExpectedTemplate::new("login", "Your login link");

    let canceller = {
        let client = Arc::clone(&client);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            client.cancel_all();
        })
    };

    let start = Instant::now();
    let err = client
        .wait_for_notification(&identity, &template, &Placeholders::new(), None)
        .await
        .unwrap_err();
    canceller.await.unwrap();

    assert!(matches!(err, Error::Cancelled { .. }), "unexpected error: {err}");
    assert!(start.elapsed() < Duration::from_secs(2));
}

#[tokio::test]
async fn caller_token_cancels_only_its_wait() {
    let client = fake_client(PollPolicy::new(Duration::from_secs(30), Duration::from_secs(600)));
    let identity = client.provision_identity(Role::Generic).await.unwrap();
    let template = ExpectedTemplate::new("login", "Your login link");
    let token = CancellationToken::new();

    let trigger = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        trigger.cancel();
    });

    let err = client
        .wait_for_notification_with_cancel(&identity, &template, &Placeholders::new(), None, &token)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Cancelled { .. }));

    // The client itself is still usable
    client.fake().unwrap().deliver(
        &identity,
        NotificationMessage::new("auth@app.example.com", "Your login link", "https://app.example.com/login?token=t1"),
    );
    let verified = client
        .wait_for_notification(&identity, &template, &Placeholders::new(), None)
        .await
        .unwrap();
    assert_eq!(verified.message.subject(), "Your login link");
}

#[tokio::test]
async fn link_not_found_for_unrelated_domain() {
    let client = fake_client(PollPolicy::default());
    let message = NotificationMessage::new(
        "noreply@app.example.com",
        "Welcome, Ada!",
        "Read our blog at https://blog.other.test/activate/abc",
    );
    let err = client.extract_link(&message, "activation").unwrap_err();
    match err {
        Error::LinkNotFound { category, body, .. } => {
            assert_eq!(category, "activation");
            assert!(body.contains("blog.other.test"));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn hardcoded_mode_only_sees_supplied_messages() {
    let config = ClientConfig::new(ProviderConfig::hardcoded([(Role::Recipient, "qa.inbox@shop.test")]))
        .with_poll(PollPolicy::new(Duration::from_millis(50), Duration::from_millis(300)));
    let client = NotificationClient::new(config).unwrap();
    assert!(!client.supports_verification());

    let identity = client.provision_identity(Role::Recipient).await.unwrap();
    assert_eq!(identity.address(), "qa.inbox@shop.test");
    let template = ExpectedTemplate::new("login", "Your login link");

    let err = client
        .wait_for_notification(&identity, &template, &Placeholders::new(), None)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Timeout { .. }));

    client.hardcoded().unwrap().supply_message(
        identity.address(),
        NotificationMessage::new("auth@app.example.com", "Your login link", ""),
    );
    assert!(client
        .wait_for_notification(&identity, &template, &Placeholders::new(), None)
        .await
        .is_ok());
}

#[test]
fn invalid_configurations_fail_at_construction() {
    let hardcoded = ClientConfig::new(ProviderConfig::hardcoded(Vec::<(Role, String)>::new()));
    assert!(matches!(
        NotificationClient::new(hardcoded),
        Err(Error::InvalidConfiguration(_))
    ));

    let zero_interval = ClientConfig::new(ProviderConfig::fake())
        .with_poll(PollPolicy::new(Duration::ZERO, Duration::from_secs(1)));
    assert!(matches!(
        NotificationClient::new(zero_interval),
        Err(Error::InvalidConfiguration(_))
    ));
}

#[test]
fn template_requiring_unknown_link_category_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("templates.yaml");
    std::fs::write(
        &path,
        "templates:\n  - name: invoice\n    subject_pattern: \"Your invoice\"\n    required_link_categories: [billing]\n",
    )
    .unwrap();
    let config = ClientConfig::new(ProviderConfig::fake()).with_templates(&path);
    let err = NotificationClient::new(config).err().unwrap();
    assert!(err.to_string().contains("billing"));
}
