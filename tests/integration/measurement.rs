use sea_orm::{ColumnTrait, EntityTrait, QueryFilter};
use serde_json::json;

use caudal::entity::measurement;

use crate::common::{TestApp, make_test_jpeg, routes};

mod submission {
    use super::*;

    #[tokio::test]
    async fn operator_can_submit_a_reading_with_a_photo() {
        let app = TestApp::spawn().await;
        let token = app.create_authenticated_user("ypf_norte", "securepass").await;

        let res = app
            .submit_measurement(
                &token,
                "1520.75",
                Some("Caudal estable"),
                Some(make_test_jpeg(640, 480)),
            )
            .await;

        assert_eq!(res.status, 201, "Submission failed: {}", res.text);
        assert_eq!(res.body["value"], "1520.75");
        assert_eq!(res.body["observation"], "Caudal estable");
        assert_eq!(res.body["has_photo"], true);
        assert_eq!(res.body["is_valid"], false);
        assert_eq!(res.body["username"], "ypf_norte");
        assert!(res.body["warning"].is_null());
    }

    #[tokio::test]
    async fn reading_without_a_photo_is_accepted() {
        let app = TestApp::spawn().await;
        let token = app.create_authenticated_user("ypf_norte", "securepass").await;

        let res = app.submit_measurement(&token, "800", None, None).await;

        assert_eq!(res.status, 201, "Submission failed: {}", res.text);
        assert_eq!(res.body["has_photo"], false);
    }

    #[tokio::test]
    async fn negative_values_are_rejected() {
        let app = TestApp::spawn().await;
        let token = app.create_authenticated_user("ypf_norte", "securepass").await;

        let res = app.submit_measurement(&token, "-5.0", None, None).await;

        assert_eq!(res.status, 400);
        assert_eq!(res.body["code"], "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn non_numeric_values_are_rejected() {
        let app = TestApp::spawn().await;
        let token = app.create_authenticated_user("ypf_norte", "securepass").await;

        let res = app.submit_measurement(&token, "mucho", None, None).await;

        assert_eq!(res.status, 400);
        assert_eq!(res.body["code"], "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn missing_value_field_is_rejected() {
        let app = TestApp::spawn().await;
        let token = app.create_authenticated_user("ypf_norte", "securepass").await;

        let form = reqwest::multipart::Form::new().text("observation", "sin valor");
        let res = app
            .client
            .post(format!("http://{}{}", app.addr, routes::MEASUREMENTS))
            .header("Authorization", format!("Bearer {token}"))
            .multipart(form)
            .send()
            .await
            .expect("Failed to send request");

        assert_eq!(res.status().as_u16(), 400);
    }

    #[tokio::test]
    async fn staff_cannot_submit_readings() {
        let app = TestApp::spawn().await;
        let token = app
            .create_user_with_role("inspector", "securepass", "staff")
            .await;

        let res = app.submit_measurement(&token, "100", None, None).await;

        assert_eq!(res.status, 403);
        assert_eq!(res.body["code"], "PERMISSION_DENIED");
    }

    #[tokio::test]
    async fn submitting_requires_a_token() {
        let app = TestApp::spawn().await;

        let form = reqwest::multipart::Form::new().text("value", "100");
        let res = app
            .client
            .post(format!("http://{}{}", app.addr, routes::MEASUREMENTS))
            .multipart(form)
            .send()
            .await
            .expect("Failed to send request");

        assert_eq!(res.status().as_u16(), 401);
    }

    #[tokio::test]
    async fn submissions_inside_the_interval_are_rate_limited() {
        let app = TestApp::spawn_with_config(|config| {
            config.upload.min_submission_interval_secs = 60;
        })
        .await;
        let token = app.create_authenticated_user("ypf_norte", "securepass").await;

        let first = app.submit_measurement(&token, "100", None, None).await;
        assert_eq!(first.status, 201, "First submission failed: {}", first.text);

        let res = app.submit_measurement(&token, "110", None, None).await;

        assert_eq!(res.status, 429);
        assert_eq!(res.body["code"], "RATE_LIMITED");
        assert!(res.headers.contains_key("retry-after"));
    }

    #[tokio::test]
    async fn oversized_photos_are_rejected() {
        let app = TestApp::spawn_with_config(|config| {
            config.storage.max_photo_size = 1024;
        })
        .await;
        let token = app.create_authenticated_user("ypf_norte", "securepass").await;

        let res = app
            .submit_measurement(&token, "100", None, Some(make_test_jpeg(800, 600)))
            .await;

        // Rejected by the streamed size check or the outer body limit.
        assert!(
            res.status == 400 || res.status == 413,
            "expected 400/413, got {}: {}",
            res.status,
            res.text
        );

        // No orphan row is left behind.
        let count = measurement::Entity::find()
            .all(&app.db)
            .await
            .expect("DB query failed")
            .len();
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn value_below_last_validated_reading_returns_a_warning() {
        let app = TestApp::spawn().await;
        let token = app.create_authenticated_user("ypf_norte", "securepass").await;
        let staff = app
            .create_user_with_role("inspector", "securepass", "staff")
            .await;

        let first = app.submit_measurement(&token, "1500", None, None).await;
        assert_eq!(first.status, 201);
        let validated = app
            .post_with_token(&routes::validate_measurement(first.id()), &json!({}), &staff)
            .await;
        assert_eq!(validated.status, 204, "Validation failed: {}", validated.text);

        let res = app.submit_measurement(&token, "900", None, None).await;

        assert_eq!(res.status, 201);
        let warning = res.body["warning"].as_str().expect("warning should be set");
        assert!(warning.contains("900"), "got: {warning}");
        assert!(warning.contains("1500"), "got: {warning}");
    }
}

mod listing {
    use super::*;

    #[tokio::test]
    async fn operators_only_see_their_own_readings() {
        let app = TestApp::spawn().await;
        let alice = app.create_authenticated_user("alice_oil", "securepass").await;
        let bob = app.create_authenticated_user("bob_gas", "securepass").await;

        app.submit_measurement(&alice, "100", None, None).await;
        app.submit_measurement(&bob, "200", None, None).await;

        let res = app.get_with_token(routes::MEASUREMENTS, &alice).await;

        assert_eq!(res.status, 200);
        assert_eq!(res.body["pagination"]["total"], 1);
        assert_eq!(res.body["data"][0]["value"], "100.00");
        assert_eq!(res.body["data"][0]["username"], "alice_oil");
    }

    #[tokio::test]
    async fn staff_see_everything_and_can_filter_by_user() {
        let app = TestApp::spawn().await;
        let alice = app.create_authenticated_user("alice_oil", "securepass").await;
        let bob = app.create_authenticated_user("bob_gas", "securepass").await;
        let staff = app
            .create_user_with_role("inspector", "securepass", "staff")
            .await;

        app.submit_measurement(&alice, "100", None, None).await;
        app.submit_measurement(&bob, "200", None, None).await;

        let all = app.get_with_token(routes::MEASUREMENTS, &staff).await;
        assert_eq!(all.status, 200);
        assert_eq!(all.body["pagination"]["total"], 2);

        let bob_id = app.user_id("bob_gas").await;
        let filtered = app
            .get_with_token(&format!("{}?user_id={bob_id}", routes::MEASUREMENTS), &staff)
            .await;
        assert_eq!(filtered.status, 200);
        assert_eq!(filtered.body["pagination"]["total"], 1);
        assert_eq!(filtered.body["data"][0]["username"], "bob_gas");
    }

    #[tokio::test]
    async fn listing_is_paginated_newest_first() {
        let app = TestApp::spawn().await;
        let token = app.create_authenticated_user("ypf_norte", "securepass").await;

        for value in ["10", "20", "30"] {
            let res = app.submit_measurement(&token, value, None, None).await;
            assert_eq!(res.status, 201);
        }

        let res = app
            .get_with_token(&format!("{}?page=1&per_page=2", routes::MEASUREMENTS), &token)
            .await;

        assert_eq!(res.status, 200);
        assert_eq!(res.body["pagination"]["total"], 3);
        assert_eq!(res.body["pagination"]["total_pages"], 2);
        assert_eq!(res.body["data"].as_array().unwrap().len(), 2);
        assert_eq!(res.body["data"][0]["value"], "30.00");
    }
}

mod photo_download {
    use super::*;

    #[tokio::test]
    async fn owner_can_download_the_stored_photo() {
        let app = TestApp::spawn().await;
        let token = app.create_authenticated_user("ypf_norte", "securepass").await;

        let created = app
            .submit_measurement(&token, "100", None, Some(make_test_jpeg(640, 480)))
            .await;
        assert_eq!(created.status, 201);

        let res = app
            .get_with_token(&routes::measurement_photo(created.id()), &token)
            .await;

        assert_eq!(res.status, 200);
        assert_eq!(res.headers["content-type"], "image/jpeg");
        assert!(res.headers.contains_key("etag"));
        // JPEG magic bytes.
        assert_eq!(&res.bytes[..2], &[0xff, 0xd8]);
    }

    #[tokio::test]
    async fn etag_match_returns_not_modified() {
        let app = TestApp::spawn().await;
        let token = app.create_authenticated_user("ypf_norte", "securepass").await;

        let created = app
            .submit_measurement(&token, "100", None, Some(make_test_jpeg(64, 64)))
            .await;
        let first = app
            .get_with_token(&routes::measurement_photo(created.id()), &token)
            .await;
        let etag = first.headers["etag"].to_str().unwrap().to_string();

        let res = app
            .client
            .get(format!(
                "http://{}{}",
                app.addr,
                routes::measurement_photo(created.id())
            ))
            .header("Authorization", format!("Bearer {token}"))
            .header("If-None-Match", etag)
            .send()
            .await
            .expect("Failed to send request");

        assert_eq!(res.status().as_u16(), 304);
    }

    #[tokio::test]
    async fn other_operators_cannot_download_the_photo() {
        let app = TestApp::spawn().await;
        let alice = app.create_authenticated_user("alice_oil", "securepass").await;
        let bob = app.create_authenticated_user("bob_gas", "securepass").await;

        let created = app
            .submit_measurement(&alice, "100", None, Some(make_test_jpeg(64, 64)))
            .await;

        let res = app
            .get_with_token(&routes::measurement_photo(created.id()), &bob)
            .await;

        assert_eq!(res.status, 404);
    }

    #[tokio::test]
    async fn photoless_measurement_returns_not_found() {
        let app = TestApp::spawn().await;
        let token = app.create_authenticated_user("ypf_norte", "securepass").await;

        let created = app.submit_measurement(&token, "100", None, None).await;

        let res = app
            .get_with_token(&routes::measurement_photo(created.id()), &token)
            .await;

        assert_eq!(res.status, 404);
        assert_eq!(res.body["code"], "NOT_FOUND");
    }
}

mod photo_processing {
    use super::*;

    /// A test JPEG carrying an APP1 EXIF segment with GPS coordinates for
    /// Neuquén (38°30'S, 68°51'W) and the given `DateTimeOriginal`.
    fn jpeg_with_exif(datetime: &str) -> Vec<u8> {
        use exif::experimental::Writer;
        use exif::{Field, In, Rational, Tag, Value};

        let dms = |d: u32, m: u32, s: u32| {
            Value::Rational(vec![
                Rational { num: d, denom: 1 },
                Rational { num: m, denom: 1 },
                Rational { num: s, denom: 1 },
            ])
        };

        let datetime_field = Field {
            tag: Tag::DateTimeOriginal,
            ifd_num: In::PRIMARY,
            value: Value::Ascii(vec![datetime.as_bytes().to_vec()]),
        };
        let latitude = Field {
            tag: Tag::GPSLatitude,
            ifd_num: In::PRIMARY,
            value: dms(38, 30, 0),
        };
        let latitude_ref = Field {
            tag: Tag::GPSLatitudeRef,
            ifd_num: In::PRIMARY,
            value: Value::Ascii(vec![b"S".to_vec()]),
        };
        let longitude = Field {
            tag: Tag::GPSLongitude,
            ifd_num: In::PRIMARY,
            value: dms(68, 51, 0),
        };
        let longitude_ref = Field {
            tag: Tag::GPSLongitudeRef,
            ifd_num: In::PRIMARY,
            value: Value::Ascii(vec![b"W".to_vec()]),
        };

        let mut writer = Writer::new();
        writer.push_field(&datetime_field);
        writer.push_field(&latitude);
        writer.push_field(&latitude_ref);
        writer.push_field(&longitude);
        writer.push_field(&longitude_ref);

        let mut blob = std::io::Cursor::new(Vec::new());
        writer
            .write(&mut blob, false)
            .expect("writing the EXIF block should not fail");
        let blob = blob.into_inner();

        // Splice the EXIF block in as an APP1 segment right after SOI.
        let base = make_test_jpeg(64, 64);
        let mut out = Vec::with_capacity(base.len() + blob.len() + 10);
        out.extend_from_slice(&base[..2]);
        out.extend_from_slice(&[0xff, 0xe1]);
        out.extend_from_slice(&((blob.len() + 8) as u16).to_be_bytes());
        out.extend_from_slice(b"Exif\0\0");
        out.extend_from_slice(&blob);
        out.extend_from_slice(&base[2..]);
        out
    }

    #[tokio::test]
    async fn exif_gps_and_capture_time_are_stored() {
        let app = TestApp::spawn().await;
        let token = app.create_authenticated_user("ypf_norte", "securepass").await;

        let res = app
            .submit_measurement(
                &token,
                "100",
                None,
                Some(jpeg_with_exif("2024:01:15 14:30:45")),
            )
            .await;

        assert_eq!(res.status, 201, "Submission failed: {}", res.text);

        let lat = res.body["captured_latitude"].as_f64().expect("latitude");
        let lon = res.body["captured_longitude"].as_f64().expect("longitude");
        assert!((lat - (-38.5)).abs() < 1e-6, "got {lat}");
        assert!((lon - (-68.85)).abs() < 1e-6, "got {lon}");

        let captured_at = res.body["captured_at"].as_str().expect("captured_at");
        let parsed = chrono::DateTime::parse_from_rfc3339(captured_at)
            .expect("captured_at should be RFC 3339");
        assert_eq!(parsed.to_rfc3339(), "2024-01-15T14:30:45+00:00");
    }

    #[tokio::test]
    async fn future_capture_timestamps_are_discarded() {
        let app = TestApp::spawn().await;
        let token = app.create_authenticated_user("ypf_norte", "securepass").await;

        let res = app
            .submit_measurement(
                &token,
                "100",
                None,
                Some(jpeg_with_exif("2099:01:01 00:00:00")),
            )
            .await;

        assert_eq!(res.status, 201, "Submission failed: {}", res.text);
        assert_eq!(res.body["has_photo"], true);

        // The implausible timestamp is dropped; the GPS fix is kept.
        assert!(res.body["captured_at"].is_null());
        let lat = res.body["captured_latitude"].as_f64().expect("latitude");
        assert!((lat - (-38.5)).abs() < 1e-6, "got {lat}");
    }

    #[tokio::test]
    async fn large_photos_are_resized_before_storage() {
        let app = TestApp::spawn().await;
        let token = app.create_authenticated_user("ypf_norte", "securepass").await;

        let created = app
            .submit_measurement(&token, "100", None, Some(make_test_jpeg(2000, 1000)))
            .await;
        assert_eq!(created.status, 201);

        let res = app
            .get_with_token(&routes::measurement_photo(created.id()), &token)
            .await;
        assert_eq!(res.status, 200);

        let img = image::load_from_memory(&res.bytes).expect("stored photo should decode");
        assert_eq!(img.width(), 1280);
        assert_eq!(img.height(), 640);
    }

    #[tokio::test]
    async fn photo_without_exif_stores_no_coordinates() {
        let app = TestApp::spawn().await;
        let token = app.create_authenticated_user("ypf_norte", "securepass").await;

        let created = app
            .submit_measurement(&token, "100", None, Some(make_test_jpeg(64, 64)))
            .await;

        assert_eq!(created.status, 201);
        assert!(created.body["captured_latitude"].is_null());
        assert!(created.body["captured_longitude"].is_null());
        assert!(created.body["captured_at"].is_null());
    }

    #[tokio::test]
    async fn manual_location_defaults_from_the_company_profile() {
        let app = TestApp::spawn().await;
        let token = app.create_authenticated_user("ypf_norte", "securepass").await;
        let staff = app
            .create_user_with_role("inspector", "securepass", "staff")
            .await;
        let user_id = app.user_id("ypf_norte").await;

        let updated = app
            .patch_with_token(
                &routes::company_profile(user_id),
                &json!({"location": "Batería Loma Campana 3", "latitude": -38.65, "longitude": -68.85}),
                &staff,
            )
            .await;
        assert_eq!(updated.status, 200, "Profile update failed: {}", updated.text);

        let res = app.submit_measurement(&token, "100", None, None).await;

        assert_eq!(res.status, 201);
        assert_eq!(res.body["manual_location"], "Batería Loma Campana 3");
        assert_eq!(res.body["target_latitude"], -38.65);
        assert_eq!(res.body["target_longitude"], -68.85);
    }

    #[tokio::test]
    async fn without_a_profile_the_location_falls_back_to_the_username() {
        let app = TestApp::spawn().await;
        let token = app.create_authenticated_user("ypf_norte", "securepass").await;

        let res = app.submit_measurement(&token, "100", None, None).await;

        assert_eq!(res.status, 201);
        assert_eq!(res.body["manual_location"], "Ubicación de ypf_norte");
    }
}

mod cleanup {
    use super::*;

    #[tokio::test]
    async fn no_measurement_rows_leak_when_the_photo_is_undecodable() {
        let app = TestApp::spawn().await;
        let token = app.create_authenticated_user("ypf_norte", "securepass").await;

        // Garbage bytes still store fine: compression falls back to the
        // original upload, so the row is kept.
        let res = app
            .submit_measurement(&token, "100", None, Some(b"not an image".to_vec()))
            .await;
        assert_eq!(res.status, 201, "Fallback storage failed: {}", res.text);
        assert_eq!(res.body["has_photo"], true);

        let user_id = app.user_id("ypf_norte").await;
        let rows = measurement::Entity::find()
            .filter(measurement::Column::UserId.eq(user_id))
            .all(&app.db)
            .await
            .expect("DB query failed");
        assert_eq!(rows.len(), 1);
        assert!(rows[0].photo_path.is_some());
    }

    #[tokio::test]
    async fn failed_photo_storage_leaves_no_row_and_no_files() {
        let app = TestApp::spawn().await;
        let token = app.create_authenticated_user("ypf_norte", "securepass").await;

        // A file squatting on the evidence directory name makes the store
        // step fail after the row was inserted.
        tokio::fs::write(app.media_root().join("evidencias"), b"")
            .await
            .expect("Failed to block the evidence directory");

        let res = app
            .submit_measurement(&token, "100", None, Some(make_test_jpeg(64, 64)))
            .await;

        assert_eq!(res.status, 500, "expected storage failure: {}", res.text);

        let rows = measurement::Entity::find()
            .all(&app.db)
            .await
            .expect("DB query failed");
        assert!(rows.is_empty(), "row should be rolled back");

        let mut tmp = tokio::fs::read_dir(app.media_root().join("tmp_uploads"))
            .await
            .expect("temp dir should exist");
        assert!(
            tmp.next_entry().await.expect("read_dir failed").is_none(),
            "temp upload should be cleaned up"
        );
    }
}
