//! Public lead intake over HTTP.

#![allow(clippy::unwrap_used)]

use cellionyx_core::Role;
use cellionyx_integration_tests::{TestContext, lead_form};
use reqwest::StatusCode;
use serde_json::{Value, json};

#[tokio::test]
async fn test_repeat_submission_updates_existing_prospect() {
    let ctx = TestContext::new().await;

    let first = ctx.submit_form(&lead_form("ada@clinic.example")).await;
    assert_eq!(first.status(), StatusCode::OK);
    let first: Value = first.json().await.unwrap();
    assert_eq!(first["success"], true);
    assert_eq!(first["message"], "Thank you! We'll be in touch shortly.");

    let mut waitlist = lead_form("ada@clinic.example");
    waitlist["ctaType"] = json!("waitlist");
    waitlist["page"] = json!("/pricing");
    let second: Value = ctx.submit_form(&waitlist).await.json().await.unwrap();
    assert_eq!(second["message"], "Welcome back! We've updated your information.");
    assert_eq!(second["prospectId"], first["prospectId"]);

    let admin = ctx
        .user_token("admin@cellionyx.example", "Admin", Role::Admin)
        .await;
    let id = first["prospectId"].as_str().unwrap();
    let prospect: Value = ctx
        .get(&format!("/reps/prospects/{id}"), &admin)
        .await
        .json()
        .await
        .unwrap();

    // History grows, first-touch attributes stay
    assert_eq!(prospect["formSubmissions"].as_array().unwrap().len(), 2);
    assert_eq!(prospect["ctaType"], "demo");
    assert_eq!(prospect["status"], "Active");
    assert!(prospect["assignedRepId"].is_null());

    let listed: Value = ctx.get("/reps/my-prospects", &admin).await.json().await.unwrap();
    assert_eq!(listed.as_array().unwrap().len(), 1);

    // Both submissions notify sales
    let subjects = ctx.mailer.lead_subjects();
    assert_eq!(subjects.len(), 2);
    assert_eq!(subjects[0], "New Demo Request: Ada Byron from Analytical Clinic");
    assert_eq!(subjects[1], "New Waitlist Signup: Ada Byron");
}

#[tokio::test]
async fn test_missing_fields_rejected() {
    let ctx = TestContext::new().await;

    let resp = ctx
        .submit_form(&json!({ "firstName": "Ada", "email": "ada@clinic.example" }))
        .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "Missing required fields");
    assert_eq!(body["details"], "First name, last name, and email are required");

    assert!(ctx.mailer.lead_subjects().is_empty());
}

#[tokio::test]
async fn test_malformed_body_rejected() {
    let ctx = TestContext::new().await;

    let resp = ctx
        .client
        .post(ctx.url("/public/submit-form"))
        .header("content-type", "application/json")
        .body("{not json")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "Invalid request body");
}

#[tokio::test]
async fn test_career_application_visible_to_admin() {
    let ctx = TestContext::new().await;

    let resp = ctx
        .client
        .post(ctx.url("/public/submit-career"))
        .json(&json!({
            "firstName": "Grace",
            "lastName": "Hopper",
            "email": "grace@example.com",
            "introduction": "Compiler person",
            "interest": "Field sales",
            "position": "Sales Rep",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let admin = ctx
        .user_token("admin@cellionyx.example", "Admin", Role::Admin)
        .await;
    let applications: Value = ctx
        .get("/admin/career-applications", &admin)
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(applications.as_array().unwrap().len(), 1);
}
