mod common;

use std::time::Duration;

use anyhow::Result;
use reqwest::{Method, StatusCode};
use serde_json::{json, Value};

use common::{TestServer, TestUser, CHALLENGE};

fn has_line(snapshot: &Value, needle: &str) -> bool {
    snapshot["data"]["page"]["console"]
        .as_array()
        .map(|lines| lines.iter().any(|l| l.as_str().unwrap_or("").contains(needle)))
        .unwrap_or(false)
}

#[tokio::test]
async fn full_run_over_http() -> Result<()> {
    let server = TestServer::start().await?;
    let user = TestUser::named("abc-123", "Ada Lovelace");
    let bundle = user.bundle();

    // Opening the challenge shows step 1 and the per-user token
    let view = server.view(&user).await?;
    assert_eq!(view["data"]["state"], json!({ "state": "step", "step": 1 }));
    assert_eq!(view["data"]["puzzle"]["user_hash"], "YWJjLTEy");
    assert_eq!(view["data"]["puzzle"]["jwt_token"], bundle.jwt_token.as_str());
    assert_eq!(view["data"]["steps"][0]["status"], "active");
    assert_eq!(view["data"]["steps"][1]["status"], "locked");

    // Steps 1 and 2
    let (status, body) = server.submit(&user, 1, common::step1_fields(&bundle)).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["result"], "advanced");
    assert_eq!(body["data"]["state"]["step"], 2);

    let (_, body) = server.submit(&user, 2, common::step2_fields(&bundle)).await?;
    assert_eq!(body["data"]["result"], "advanced", "{}", body);

    // Step 3 artifacts appear on the page after the discovery delay
    let (srv, usr) = (&server, &user);
    let console_secret = bundle.console_secret.as_str();
    common::eventually(Duration::from_secs(3), move || async move {
        let snapshot = srv.devtools(usr).await?;
        Ok(has_line(&snapshot, console_secret))
    })
    .await?;
    let snapshot = server.devtools(&user).await?;
    assert_eq!(snapshot["data"]["active_step"], 3);
    assert_eq!(snapshot["data"]["page"]["nodes"][0]["id"], bundle.hidden_node_id().as_str());
    assert_eq!(snapshot["data"]["page"]["nodes"][0]["text"], bundle.dom_secret.as_str());

    let (_, body) = server.submit(&user, 3, common::step3_fields(&bundle)).await?;
    assert_eq!(body["data"]["result"], "advanced", "{}", body);

    // Hidden node is gone once step 3 is done
    let snapshot = server.devtools(&user).await?;
    assert_eq!(snapshot["data"]["page"]["nodes"], json!([]));

    // Step 4: call the endpoint with the bearer token and submit its answer
    let secret = server
        .client
        .get(server.url(&bundle.api_endpoint_path))
        .bearer_auth(&bundle.bearer_auth_token)
        .send()
        .await?;
    assert_eq!(secret.status(), StatusCode::OK);
    let secret_body = secret.text().await?;
    assert!(secret_body.contains("ACCESS_GRANTED"));

    let (_, body) = server
        .submit(&user, 4, common::step4_fields(&bundle, &secret_body))
        .await?;
    assert_eq!(body["data"]["result"], "advanced", "{}", body);

    // Step 5: key in local storage, verify() exposed, console batch delayed
    let ciphertext = bundle.cipher.xor_ciphertext_hex.as_str();
    common::eventually(Duration::from_secs(3), move || async move {
        let snapshot = srv.devtools(usr).await?;
        Ok(has_line(&snapshot, ciphertext))
    })
    .await?;
    let snapshot = server.devtools(&user).await?;
    let xor_key = snapshot["data"]["page"]["local_storage"][bundle.xor_storage_key()]
        .as_str()
        .unwrap_or_default()
        .to_string();
    assert_eq!(xor_key, bundle.cipher.xor_key);
    assert_eq!(snapshot["data"]["page"]["globals"], json!(["__securityChallenge"]));

    let verify = server
        .as_user(
            Method::POST,
            &format!("/api/challenges/{}/devtools/verify", CHALLENGE),
            &user,
        )
        .send()
        .await?
        .json::<Value>()
        .await?;
    let sentinel = verify["data"]["result"].as_str().unwrap_or_default().to_string();
    assert_eq!(sentinel, "VERIFIED_YWJjLTEy");

    let (_, body) = server
        .submit(
            &user,
            5,
            common::step5_fields(&bundle, &xor_key, &sentinel, "submitted by ada lovelace"),
        )
        .await?;
    assert_eq!(body["data"]["result"], "advanced", "{}", body);
    assert_eq!(body["data"]["state"], json!({ "state": "completed" }));
    assert_eq!(body["data"]["redirect"], json!({ "to": "/dashboard", "after_ms": 3000 }));

    // The finished challenge no longer holds an open session
    assert_eq!(server.open_sessions().await?, 0);

    let view = server.view(&user).await?;
    assert_eq!(view["data"]["state"]["state"], "completed");
    assert_eq!(view["data"]["progress"]["completedSteps"], json!([1, 2, 3, 4, 5]));
    assert_eq!(view["data"]["progress"]["currentStep"], 6);

    // verify() went away with the step 5 clues
    let res = server
        .as_user(
            Method::POST,
            &format!("/api/challenges/{}/devtools/verify", CHALLENGE),
            &user,
        )
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    Ok(())
}

#[tokio::test]
async fn steps_cannot_be_skipped_or_repeated() -> Result<()> {
    let server = TestServer::start().await?;
    let user = TestUser::new("abc-123");
    let bundle = user.bundle();

    let (status, body) = server.submit(&user, 3, common::step3_fields(&bundle)).await?;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "CONFLICT");

    let (status, _) = server.submit(&user, 1, common::step1_fields(&bundle)).await?;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = server.submit(&user, 1, common::step1_fields(&bundle)).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"], json!({ "result": "already_completed", "step": 1 }));

    let view = server.view(&user).await?;
    assert_eq!(view["data"]["progress"]["completedSteps"], json!([1]));
    Ok(())
}

#[tokio::test]
async fn bad_submissions_are_reported() -> Result<()> {
    let server = TestServer::start().await?;
    let user = TestUser::new("abc-123");

    let (status, _) = server.submit(&user, 9, json!({})).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = server.submit(&user, 1, json!({ "decoded_payload": 5 })).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "BAD_REQUEST");

    // A wrong answer is a normal outcome, not an error
    let (status, body) = server.submit(&user, 1, json!({ "decoded_payload": "{}" })).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["result"], "rejected");
    assert_eq!(body["data"]["outcome"]["passed"], false);
    Ok(())
}

#[tokio::test]
async fn step3_feedback_is_itemized() -> Result<()> {
    let server = TestServer::start().await?;
    let user = TestUser::new("abc-123");
    let bundle = user.bundle();

    server.submit(&user, 1, common::step1_fields(&bundle)).await?;
    server.submit(&user, 2, common::step2_fields(&bundle)).await?;

    let mut fields = common::step3_fields(&bundle);
    fields["console_secret"] = json!("CONSOLE_SECRET_nope");
    let (_, body) = server.submit(&user, 3, fields).await?;

    assert_eq!(body["data"]["result"], "rejected");
    let outcome = &body["data"]["outcome"];
    assert_eq!(outcome["message"], "1 of 3 checks failed: console_secret");
    assert_eq!(outcome["checks"][0]["passed"], true);
    assert_eq!(outcome["checks"][1]["passed"], true);
    assert_eq!(outcome["checks"][2]["passed"], false);
    Ok(())
}

#[tokio::test]
async fn progress_survives_identity_changes_and_resets() -> Result<()> {
    let server = TestServer::start().await?;
    let user = TestUser::new("abc-123");
    let bundle = user.bundle();

    server.submit(&user, 1, common::step1_fields(&bundle)).await?;

    // Same id, new display name: the session is reopened from storage
    let renamed = TestUser::named("abc-123", "Ada");
    let view = server.view(&renamed).await?;
    assert_eq!(view["data"]["state"]["step"], 2);
    assert_eq!(view["data"]["user"]["signature_name"], "Ada");

    // Another user starts fresh
    let other = server.view(&TestUser::new("someone-else")).await?;
    assert_eq!(other["data"]["state"]["step"], 1);

    let res = server
        .as_user(Method::DELETE, &format!("/api/challenges/{}", CHALLENGE), &renamed)
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::OK);
    let body = res.json::<Value>().await?;
    assert_eq!(body["data"]["state"], json!({ "state": "step", "step": 1 }));
    assert_eq!(body["data"]["progress"]["completedSteps"], json!([]));

    // Reset closed this user's session; the other user's stays open
    assert_eq!(server.open_sessions().await?, 1);
    Ok(())
}
