use crate::common::{TestApp, routes};

const UTF8_BOM: &[u8] = b"\xef\xbb\xbf";

fn csv_text(bytes: &[u8]) -> String {
    assert!(bytes.starts_with(UTF8_BOM), "CSV should start with a UTF-8 BOM");
    String::from_utf8(bytes[UTF8_BOM.len()..].to_vec()).expect("CSV should be valid UTF-8")
}

#[tokio::test]
async fn export_requires_a_token() {
    let app = TestApp::spawn().await;

    let res = app.get_without_token(routes::EXPORT_CSV).await;

    assert_eq!(res.status, 401);
}

#[tokio::test]
async fn operators_export_only_their_own_readings() {
    let app = TestApp::spawn().await;
    let mine = app.create_authenticated_user("ypf_norte", "securepass").await;
    let other = app.create_authenticated_user("shell_sur", "securepass").await;
    app.submit_measurement(&mine, "111.11", Some("turno mañana"), None).await;
    app.submit_measurement(&other, "222.22", None, None).await;

    let res = app.get_with_token(routes::EXPORT_CSV, &mine).await;

    assert_eq!(res.status, 200);
    let text = csv_text(&res.bytes);
    assert!(text.contains("Usuario (Empresa)"), "Missing header row: {text}");
    assert!(text.contains("Valor (m³/h)"));
    assert!(text.contains("111.11"));
    assert!(text.contains("turno mañana"));
    assert!(!text.contains("222.22"), "Other user's rows leaked: {text}");

    let disposition = res.headers["content-disposition"]
        .to_str()
        .expect("disposition header");
    assert!(
        disposition.contains("mediciones_ypf_norte_"),
        "Unexpected filename: {disposition}"
    );
    assert!(disposition.ends_with(".csv\""));
}

#[tokio::test]
async fn staff_export_everything_by_default() {
    let app = TestApp::spawn().await;
    let operator = app.create_authenticated_user("ypf_norte", "securepass").await;
    let staff = app
        .create_user_with_role("inspector", "securepass", "staff")
        .await;
    app.submit_measurement(&operator, "111.11", None, None).await;

    let res = app.get_with_token(routes::EXPORT_CSV, &staff).await;

    assert_eq!(res.status, 200);
    let text = csv_text(&res.bytes);
    assert!(text.contains("111.11"));
    assert!(text.contains("Pendiente"));

    let disposition = res.headers["content-disposition"]
        .to_str()
        .expect("disposition header");
    assert!(
        disposition.contains("mediciones_sistema_completo_"),
        "Unexpected filename: {disposition}"
    );
}

#[tokio::test]
async fn staff_can_export_a_single_user() {
    let app = TestApp::spawn().await;
    let operator = app.create_authenticated_user("ypf_norte", "securepass").await;
    let other = app.create_authenticated_user("shell_sur", "securepass").await;
    let staff = app
        .create_user_with_role("inspector", "securepass", "staff")
        .await;
    app.submit_measurement(&operator, "111.11", None, None).await;
    app.submit_measurement(&other, "222.22", None, None).await;
    let user_id = app.user_id("ypf_norte").await;

    let res = app
        .get_with_token(&format!("{}?user_id={user_id}", routes::EXPORT_CSV), &staff)
        .await;

    assert_eq!(res.status, 200);
    let text = csv_text(&res.bytes);
    assert!(text.contains("111.11"));
    assert!(!text.contains("222.22"));

    let disposition = res.headers["content-disposition"]
        .to_str()
        .expect("disposition header");
    assert!(disposition.contains("mediciones_ypf_norte_"));
}

#[tokio::test]
async fn operators_cannot_export_someone_else() {
    let app = TestApp::spawn().await;
    let mine = app.create_authenticated_user("ypf_norte", "securepass").await;
    app.create_authenticated_user("shell_sur", "securepass").await;
    let other_id = app.user_id("shell_sur").await;

    let res = app
        .get_with_token(&format!("{}?user_id={other_id}", routes::EXPORT_CSV), &mine)
        .await;

    assert_eq!(res.status, 403);
    assert_eq!(res.body["code"], "PERMISSION_DENIED");
}

#[tokio::test]
async fn exporting_an_unknown_user_is_not_found() {
    let app = TestApp::spawn().await;
    let staff = app
        .create_user_with_role("inspector", "securepass", "staff")
        .await;

    let res = app
        .get_with_token(&format!("{}?user_id=999999", routes::EXPORT_CSV), &staff)
        .await;

    assert_eq!(res.status, 404);
    assert_eq!(res.body["code"], "NOT_FOUND");
}

#[tokio::test]
async fn validated_readings_are_marked_in_spanish() {
    let app = TestApp::spawn().await;
    let operator = app.create_authenticated_user("ypf_norte", "securepass").await;
    let staff = app
        .create_user_with_role("inspector", "securepass", "staff")
        .await;
    let created = app.submit_measurement(&operator, "150", None, None).await;
    app.post_with_token(
        &routes::validate_measurement(created.id()),
        &serde_json::json!({}),
        &staff,
    )
    .await;

    let res = app.get_with_token(routes::EXPORT_CSV, &operator).await;

    let text = csv_text(&res.bytes);
    assert!(text.contains("Validado"));
    assert!(!text.contains("Pendiente"));
}
