mod common;

use assetgen::comfyui::{first_output_image, ComfyUIClient, ImageRef};
use assetgen::error::AppError;
use assetgen::workflow::JobDocument;
use common::{spawn, spawn_silent, workflow_json, FakeComfy, PROMPT_ID};
use std::sync::Arc;
use std::time::{Duration, Instant};

async fn client_for(fake: FakeComfy) -> (Arc<FakeComfy>, ComfyUIClient) {
    let fake = Arc::new(fake);
    let base = spawn(fake.clone()).await;
    (fake, ComfyUIClient::new(&base))
}

#[tokio::test]
async fn queue_prompt_returns_prompt_id_and_wraps_graph() {
    let (fake, client) = client_for(FakeComfy::default()).await;
    let document = JobDocument::from_value(workflow_json()).unwrap();

    let prompt_id = client.queue_prompt(&document).await.unwrap();
    assert_eq!(prompt_id, PROMPT_ID);

    let queued = fake.queued();
    assert_eq!(queued.len(), 1);
    assert_eq!(queued[0]["prompt"]["9"]["class_type"], "SaveImage");
}

#[tokio::test]
async fn missing_prompt_id_is_a_protocol_error() {
    let fake = FakeComfy { omit_prompt_id: true, ..Default::default() };
    let (_fake, client) = client_for(fake).await;
    let document = JobDocument::from_value(workflow_json()).unwrap();
    let err = client.queue_prompt(&document).await.unwrap_err();
    assert!(matches!(err, AppError::Protocol(_)), "got {:?}", err);
}

#[tokio::test]
async fn await_history_polls_until_the_entry_appears() {
    let fake = FakeComfy { history_ready_after: 3, ..Default::default() };
    let (fake, client) = client_for(fake).await;

    let started = Instant::now();
    let entry = client.await_history(PROMPT_ID, Duration::from_secs(10)).await.unwrap();
    let elapsed = started.elapsed();

    let image = first_output_image(&entry).unwrap();
    assert_eq!(image.filename, "assetgen_00001_.png");

    let polls = fake.polls();
    assert_eq!(polls.len(), 4);
    for pair in polls.windows(2) {
        let gap = pair[1] - pair[0];
        assert!(gap >= Duration::from_millis(450), "polls too close: {:?}", gap);
    }
    assert!(elapsed >= Duration::from_millis(1400));
    assert!(elapsed < Duration::from_secs(10));
}

#[tokio::test]
async fn await_history_gives_up_at_the_deadline() {
    let fake = FakeComfy { history_ready_after: usize::MAX, ..Default::default() };
    let (fake, client) = client_for(fake).await;

    let started = Instant::now();
    let err = client.await_history(PROMPT_ID, Duration::from_millis(1200)).await.unwrap_err();
    let elapsed = started.elapsed();

    match err {
        AppError::Timeout { prompt_id, last_error } => {
            assert_eq!(prompt_id, PROMPT_ID);
            assert!(last_error.is_none());
        }
        other => panic!("expected timeout, got {:?}", other),
    }
    assert!(elapsed >= Duration::from_millis(1200));
    assert!(elapsed < Duration::from_secs(3));
    assert!(fake.polls().len() >= 2);
}

#[tokio::test]
async fn failed_polls_are_retried_and_reported_on_timeout() {
    let (fake, client) = client_for(FakeComfy { fail_history: true, ..Default::default() }).await;

    let err = client.await_history(PROMPT_ID, Duration::from_millis(800)).await.unwrap_err();
    match err {
        AppError::Timeout { last_error: Some(message), .. } => assert!(message.contains("500")),
        other => panic!("expected timeout with last error, got {:?}", other),
    }
    assert!(fake.polls().len() >= 2);
}

#[tokio::test]
async fn unanswered_poll_still_ends_at_the_deadline() {
    let client = ComfyUIClient::new(&spawn_silent().await);

    let started = Instant::now();
    let err = client.await_history(PROMPT_ID, Duration::from_secs(1)).await.unwrap_err();
    let elapsed = started.elapsed();

    match err {
        AppError::Timeout { last_error: Some(message), .. } => assert!(message.contains("pending")),
        other => panic!("expected timeout with a pending poll, got {:?}", other),
    }
    assert!(elapsed >= Duration::from_millis(950));
    assert!(elapsed < Duration::from_secs(3), "took {:?}", elapsed);
}

#[tokio::test]
async fn fetch_image_sends_filename_subfolder_and_type() {
    let (fake, client) = client_for(FakeComfy::default()).await;
    let image = ImageRef {
        filename: "out 1.png".into(),
        subfolder: "sprites".into(),
        kind: "output".into(),
    };

    let bytes = client.fetch_image(&image).await.unwrap();
    assert_eq!(bytes, b"fake image bytes");

    let views = fake.views.lock().unwrap().clone();
    assert_eq!(views.len(), 1);
    assert_eq!(views[0]["filename"], "out 1.png");
    assert_eq!(views[0]["subfolder"], "sprites");
    assert_eq!(views[0]["type"], "output");
}

#[tokio::test]
async fn checkpoints_come_from_models_endpoint() {
    let (_fake, client) = client_for(FakeComfy::default()).await;
    let list = client.get_checkpoints().await.unwrap();
    assert_eq!(list[0], "juggernautXL_v9.safetensors");
    assert!(client.get_models_in_category("../etc").await.is_err());
}

#[tokio::test]
async fn unreachable_service_is_an_http_error() {
    let client = ComfyUIClient::new("127.0.0.1:1");
    assert_eq!(client.base_url(), "http://127.0.0.1:1");
    let document = JobDocument::from_value(workflow_json()).unwrap();
    let err = client.queue_prompt(&document).await.unwrap_err();
    assert!(matches!(err, AppError::HttpClient(_)));
}
