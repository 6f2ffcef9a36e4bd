mod common;

use common::{
    combat_entry, order_request, race_entry, TestApp, ADMIN_EMAIL, LEAD_EMAIL,
};
use serde_json::{json, Value};
use uuid::Uuid;

async fn place_order(app: &TestApp, email: &str, competitions: Value) -> Value {
    let response = app
        .post_json(
            "/orders",
            Some(email),
            &order_request("RAZORPAY", competitions),
        )
        .await;
    assert_eq!(response.status(), 201);
    response.json().await.unwrap()
}

async fn put_json(app: &TestApp, path: &str, email: &str, body: &Value) -> reqwest::Response {
    app.client
        .put(app.url(path))
        .header("X-User-Email", email)
        .json(body)
        .send()
        .await
        .expect("Failed to execute request")
}

#[tokio::test]
async fn admin_routes_require_an_admin() {
    let app = TestApp::spawn().await;

    let anonymous = app.get("/admin/teams", None).await;
    assert_eq!(anonymous.status(), 401);

    let participant = app.get("/admin/teams", Some(LEAD_EMAIL)).await;
    assert_eq!(participant.status(), 403);

    let admin = app.get("/admin/teams", Some("Organiser@RoboMania.in")).await;
    assert_eq!(admin.status(), 200);
}

#[tokio::test]
async fn teams_can_be_filtered_by_payment_status() {
    let app = TestApp::spawn().await;
    app.mount_razorpay_order("order_PAID").await;
    place_order(&app, LEAD_EMAIL, json!([race_entry(4.0)])).await;
    app.set_razorpay_status(
        "order_PAID",
        "paid",
        json!([{ "id": "pay_1", "status": "captured", "order_id": "order_PAID" }]),
    )
    .await;
    app.get("/payments/status?order_ref=order_PAID", Some(LEAD_EMAIL))
        .await;

    app.mount_razorpay_order("order_OPEN").await;
    place_order(&app, "second@x.com", json!([race_entry(3.0)])).await;

    let all: Vec<Value> = app
        .get("/admin/teams", Some(ADMIN_EMAIL))
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(all.len(), 2);

    let paid: Vec<Value> = app
        .get("/admin/teams?payment_status=COMPLETED", Some(ADMIN_EMAIL))
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(paid.len(), 1);
    assert_eq!(paid[0]["user_email"], LEAD_EMAIL);
    assert_eq!(paid[0]["status"], "CONFIRMED");

    let pending: Vec<Value> = app
        .get("/admin/registrations?payment_status=PENDING", Some(ADMIN_EMAIL))
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0]["payment_id"], "order_OPEN");
}

#[tokio::test]
async fn team_detail_and_status_updates() {
    let app = TestApp::spawn().await;
    app.mount_razorpay_order("order_ST").await;
    let order = place_order(&app, LEAD_EMAIL, json!([race_entry(4.0)])).await;
    let team_id = order["team_id"].as_str().unwrap();

    let detail: Value = app
        .get(&format!("/admin/teams/{}", team_id), Some(ADMIN_EMAIL))
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(detail["id"], team_id);
    assert_eq!(detail["registrations"].as_array().unwrap().len(), 1);

    let approved = put_json(
        &app,
        &format!("/admin/teams/{}/status", team_id),
        ADMIN_EMAIL,
        &json!({ "status": "APPROVED" }),
    )
    .await;
    assert_eq!(approved.status(), 200);
    let approved: Value = approved.json().await.unwrap();
    assert_eq!(approved["status"], "APPROVED");

    let confirmed = put_json(
        &app,
        &format!("/admin/teams/{}/status", team_id),
        ADMIN_EMAIL,
        &json!({ "status": "CONFIRMED" }),
    )
    .await;
    assert_eq!(confirmed.status(), 400);

    let unknown = put_json(
        &app,
        &format!("/admin/teams/{}/status", Uuid::new_v4()),
        ADMIN_EMAIL,
        &json!({ "status": "REJECTED" }),
    )
    .await;
    assert_eq!(unknown.status(), 404);

    let missing = app
        .get(&format!("/admin/teams/{}", Uuid::new_v4()), Some(ADMIN_EMAIL))
        .await;
    assert_eq!(missing.status(), 404);
}

#[tokio::test]
async fn dashboard_counts_revenue_from_confirmed_rows_only() {
    let app = TestApp::spawn().await;
    app.mount_razorpay_order("order_DASH").await;
    place_order(&app, LEAD_EMAIL, json!([race_entry(4.0)])).await;
    app.set_razorpay_status(
        "order_DASH",
        "paid",
        json!([{ "id": "pay_D", "status": "captured", "order_id": "order_DASH" }]),
    )
    .await;
    app.get("/payments/status?order_ref=order_DASH", Some(LEAD_EMAIL))
        .await;

    app.mount_razorpay_order("order_WAR").await;
    place_order(
        &app,
        "second@x.com",
        json!([combat_entry(&Uuid::new_v4().to_string(), 7.0)]),
    )
    .await;

    let stats: Value = app
        .get("/admin/stats", Some(ADMIN_EMAIL))
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(stats["total_teams"], 2);
    assert_eq!(stats["total_registrations"], 2);
    assert_eq!(stats["pending_registrations"], 1);
    assert_eq!(stats["confirmed_revenue"], 200);
    assert_eq!(stats["teams_by_payment_status"]["COMPLETED"], 1);

    let competitions = stats["competitions"].as_array().unwrap();
    assert_eq!(competitions.len(), 3);
    let race = competitions
        .iter()
        .find(|c| c["competition_type"] == "ROBORACE")
        .unwrap();
    assert_eq!(race["confirmed"], 1);
    assert_eq!(race["display_name"], "RoboRace");
    let combat = competitions
        .iter()
        .find(|c| c["competition_type"] == "ROBOWARS")
        .unwrap();
    assert_eq!(combat["registrations"], 1);
    assert_eq!(combat["confirmed_revenue"], 0);
}

#[tokio::test]
async fn reminders_go_to_teams_with_unpaid_registrations() {
    let app = TestApp::spawn().await;
    app.mount_razorpay_order("order_REM").await;
    place_order(&app, LEAD_EMAIL, json!([race_entry(4.0)])).await;
    place_order(&app, "second@x.com", json!([race_entry(2.0)])).await;
    app.wait_for_emails(2).await;

    let response = app
        .client
        .post(app.url("/admin/reminders"))
        .header("X-User-Email", ADMIN_EMAIL)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["teams_notified"], 2);

    let emails = app.wait_for_emails(4).await;
    let reminders: Vec<_> = emails
        .iter()
        .filter(|e| e.subject.contains("complete your payment"))
        .collect();
    assert_eq!(reminders.len(), 2);
    assert!(reminders.iter().any(|e| e.to == "second@x.com"));
}

#[tokio::test]
async fn contact_messages_are_validated_and_listed() {
    let app = TestApp::spawn().await;

    let accepted = app
        .post_json(
            "/contact",
            None,
            &json!({
                "name": "Meera",
                "email": "Meera@Example.com",
                "subject": "Venue",
                "message": "Where is the arena?"
            }),
        )
        .await;
    assert_eq!(accepted.status(), 201);

    let rejected = app
        .post_json(
            "/contact",
            None,
            &json!({
                "name": "Meera",
                "email": "not-an-email",
                "subject": "Venue",
                "message": "Where is the arena?"
            }),
        )
        .await;
    assert_eq!(rejected.status(), 422);

    let contacts: Vec<Value> = app
        .get("/admin/contacts", Some(ADMIN_EMAIL))
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(contacts.len(), 1);
    assert_eq!(contacts[0]["email"], "meera@example.com");
}

#[tokio::test]
async fn profile_round_trip() {
    let app = TestApp::spawn().await;

    let missing = app.get("/profile", Some(LEAD_EMAIL)).await;
    assert_eq!(missing.status(), 404);

    let saved = put_json(
        &app,
        "/profile",
        LEAD_EMAIL,
        &json!({ "name": "Asha", "phone": "9876543210", "institution": "IIT Delhi" }),
    )
    .await;
    assert_eq!(saved.status(), 200);

    let profile: Value = app
        .get("/profile", Some(LEAD_EMAIL))
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(profile["email"], LEAD_EMAIL);
    assert_eq!(profile["name"], "Asha");
    assert_eq!(profile["institution"], "IIT Delhi");

    let invalid = put_json(
        &app,
        "/profile",
        LEAD_EMAIL,
        &json!({ "name": "Asha", "phone": "12" }),
    )
    .await;
    assert_eq!(invalid.status(), 422);
}
