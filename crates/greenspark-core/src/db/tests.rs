//! Database tests

use super::*;
use crate::models::*;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalized::{sample_bill_json, NormalizedBill};
    use chrono::Duration;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn new_user(name: &str) -> NewUser {
        NewUser {
            email: format!("{}@example.com", name),
            first_name: "Test".to_string(),
            last_name: name.to_string(),
            username: name.to_string(),
            password: "Secret1!".to_string(),
            timezone: None,
        }
    }

    fn create_user(db: &Database, name: &str) -> User {
        db.create_user(&new_user(name), "$argon2id$stub", UserRole::User, true)
            .unwrap()
    }

    fn manual_bill(start: NaiveDate, end: NaiveDate, kwh: f64, cost: f64) -> NewManualBill {
        NewManualBill {
            billing_period_start: start,
            billing_period_end: end,
            kwh_total: kwh,
            cost_total: cost,
            provider: "BESCOM".to_string(),
        }
    }

    fn new_appliance(name: &str, catalog: Option<&str>, watts: Option<i64>) -> NewAppliance {
        NewAppliance {
            appliance_catalog_id: catalog.map(str::to_string),
            custom_name: name.to_string(),
            count: 1,
            custom_wattage: watts,
            hours_per_day: 4.0,
            days_per_week: 7,
            brand: Some("Voltas".to_string()),
            model: None,
            star_rating: None,
            purchase_year: None,
            notes: None,
        }
    }

    #[test]
    fn test_in_memory_db() {
        let db = Database::in_memory().unwrap();
        db.ping().unwrap();
        assert_eq!(db.count_users(&UserFilter::default()).unwrap(), 0);
    }

    #[test]
    fn test_schema_tables_exist() {
        let db = Database::in_memory().unwrap();
        let conn = db.conn().unwrap();
        for table in [
            "users",
            "revoked_tokens",
            "bills",
            "appliance_catalog",
            "user_appliances",
            "appliance_estimates",
            "insights",
        ] {
            let count: i64 = conn
                .query_row(
                    "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?",
                    [table],
                    |row| row.get(0),
                )
                .unwrap();
            assert_eq!(count, 1, "missing table {}", table);
        }
    }

    #[test]
    fn test_user_crud() {
        let db = Database::in_memory().unwrap();
        let user = create_user(&db, "asha");
        assert_eq!(user.role, UserRole::User);
        assert_eq!(user.timezone, DEFAULT_TIMEZONE);
        assert!(user.is_active);

        assert_eq!(db.get_user(user.id).unwrap().unwrap().email, "asha@example.com");
        assert!(db.get_user_by_email("ASHA@example.com").unwrap().is_some());
        assert!(db.get_user_by_login("asha").unwrap().is_some());
        assert!(db.get_user_by_login("asha@example.com").unwrap().is_some());
        assert!(db.get_user_by_login("nobody").unwrap().is_none());

        let updated = db
            .update_user_profile(
                user.id,
                &UserUpdate {
                    first_name: Some("Asha".to_string()),
                    ..UserUpdate::default()
                },
            )
            .unwrap();
        assert_eq!(updated.first_name, "Asha");
        assert_eq!(updated.last_name, "asha");

        db.set_user_role(user.id, UserRole::Admin).unwrap();
        db.set_user_active(user.id, false).unwrap();
        db.set_user_verified(user.id, false).unwrap();
        db.set_tokens_valid_from(user.id, 1_700_000_000_000).unwrap();
        let reloaded = db.get_user(user.id).unwrap().unwrap();
        assert!(reloaded.is_admin());
        assert!(!reloaded.is_active);
        assert!(!reloaded.is_verified);
        assert_eq!(reloaded.tokens_valid_from, Some(1_700_000_000_000));

        assert!(db.delete_user(user.id).unwrap());
        assert!(db.get_user(user.id).unwrap().is_none());
        assert!(!db.delete_user(user.id).unwrap());
    }

    #[test]
    fn test_duplicate_user_conflicts() {
        let db = Database::in_memory().unwrap();
        create_user(&db, "asha");

        let mut same_email = new_user("other");
        same_email.email = "asha@example.com".to_string();
        assert!(matches!(
            db.create_user(&same_email, "h", UserRole::User, false),
            Err(Error::Conflict(_))
        ));

        let mut same_username = new_user("asha");
        same_username.email = "fresh@example.com".to_string();
        assert!(matches!(
            db.create_user(&same_username, "h", UserRole::User, false),
            Err(Error::Conflict(_))
        ));
    }

    #[test]
    fn test_username_update_conflict() {
        let db = Database::in_memory().unwrap();
        create_user(&db, "asha");
        let ravi = create_user(&db, "ravi");
        let result = db.update_user_profile(
            ravi.id,
            &UserUpdate {
                username: Some("asha".to_string()),
                ..UserUpdate::default()
            },
        );
        assert!(matches!(result, Err(Error::Conflict(_))));
    }

    #[test]
    fn test_list_users_with_filters() {
        let db = Database::in_memory().unwrap();
        let asha = create_user(&db, "asha");
        create_user(&db, "ravi");
        create_user(&db, "meena");
        db.set_user_role(asha.id, UserRole::Admin).unwrap();

        let all = UserFilter::default();
        assert_eq!(db.count_users(&all).unwrap(), 3);
        assert_eq!(db.list_users(&all, 0, 2).unwrap().len(), 2);
        assert_eq!(db.list_users(&all, 2, 2).unwrap().len(), 1);

        let admins = UserFilter {
            role: Some(UserRole::Admin),
            ..UserFilter::default()
        };
        let listed = db.list_users(&admins, 0, 10).unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, asha.id);

        let search = UserFilter {
            search: Some("RAV".to_string()),
            ..UserFilter::default()
        };
        assert_eq!(db.count_users(&search).unwrap(), 1);

        assert_eq!(db.count_active_admins().unwrap(), 1);
        db.set_user_active(asha.id, false).unwrap();
        assert_eq!(db.count_active_admins().unwrap(), 0);
    }

    #[test]
    fn test_revoked_tokens() {
        let db = Database::in_memory().unwrap();
        assert!(!db.is_token_revoked("jti-1").unwrap());
        db.revoke_token("jti-1", 100).unwrap();
        db.revoke_token("jti-2", 10_000).unwrap();
        // revoking twice is harmless
        db.revoke_token("jti-1", 100).unwrap();
        assert!(db.is_token_revoked("jti-1").unwrap());

        assert_eq!(db.purge_expired_tokens(1_000).unwrap(), 1);
        assert!(!db.is_token_revoked("jti-1").unwrap());
        assert!(db.is_token_revoked("jti-2").unwrap());
    }

    #[test]
    fn test_placeholder_and_manual_bills() {
        let db = Database::in_memory().unwrap();
        let user = create_user(&db, "asha");

        let placeholder = db
            .create_placeholder_bill(user.id, "s3://greenspark-bills/u/a.pdf")
            .unwrap();
        assert_eq!(placeholder.parse_status, ParseStatus::Processing);
        assert_eq!(placeholder.source_type, SourceType::Pdf);
        assert_eq!(placeholder.provider, "Pending Parse");
        assert_eq!(placeholder.billing_period_start, date(1970, 1, 1));
        assert_eq!(placeholder.billing_period_end, date(1970, 2, 2));
        assert_eq!(placeholder.kwh_total, 10.0);

        let manual = db
            .create_manual_bill(user.id, &manual_bill(date(2024, 1, 1), date(2024, 1, 31), 210.0, 1650.0))
            .unwrap();
        assert_eq!(manual.parse_status, ParseStatus::Success);
        assert_eq!(manual.source_type, SourceType::Manual);
        assert!(manual.file_uri.is_none());
        assert_eq!(manual.billing_days(), 30);
    }

    #[test]
    fn test_complete_bill_parse() {
        let db = Database::in_memory().unwrap();
        let user = create_user(&db, "asha");
        let bill = db
            .create_placeholder_bill(user.id, "s3://greenspark-bills/u/a.pdf")
            .unwrap();
        let parsed = NormalizedBill::from_value(sample_bill_json()).unwrap();

        let done = db.complete_bill_parse(bill.id, &parsed, "sha256:abc").unwrap();
        assert_eq!(done.parse_status, ParseStatus::Success);
        assert_eq!(done.provider, "BESCOM");
        assert_eq!(done.kwh_total, 250.0);
        assert_eq!(done.cost_total, 1900.0);
        assert_eq!(done.billing_period_start, date(2024, 1, 1));
        assert_eq!(done.parser_version.as_deref(), Some("1.1"));
        assert_eq!(done.checksum.as_deref(), Some("sha256:abc"));
        let stored = done.normalized_json.unwrap();
        assert_eq!(stored["account"]["consumer_id"], "1234567890");

        assert!(matches!(
            db.complete_bill_parse(uuid::Uuid::new_v4(), &parsed, "x"),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn test_list_bills_filter_and_order() {
        let db = Database::in_memory().unwrap();
        let asha = create_user(&db, "asha");
        let ravi = create_user(&db, "ravi");
        db.create_manual_bill(asha.id, &manual_bill(date(2024, 1, 1), date(2024, 1, 31), 200.0, 1600.0))
            .unwrap();
        db.create_manual_bill(asha.id, &manual_bill(date(2024, 2, 1), date(2024, 2, 29), 300.0, 2400.0))
            .unwrap();
        db.create_placeholder_bill(asha.id, "s3://greenspark-bills/x/y.pdf")
            .unwrap();
        db.create_manual_bill(ravi.id, &manual_bill(date(2024, 1, 1), date(2024, 1, 31), 100.0, 800.0))
            .unwrap();

        let mut filter = BillFilter::for_user(asha.id);
        assert_eq!(db.count_bills(&filter).unwrap(), 3);

        filter.source_type = Some(SourceType::Manual);
        filter.order_by = Some("kwh_total".to_string());
        filter.order_desc = true;
        let bills = db.list_bills(&filter).unwrap();
        assert_eq!(bills.len(), 2);
        assert_eq!(bills[0].kwh_total, 300.0);
        assert_eq!(bills[1].kwh_total, 200.0);

        filter.order_desc = false;
        filter.limit = 1;
        let bills = db.list_bills(&filter).unwrap();
        assert_eq!(bills.len(), 1);
        assert_eq!(bills[0].kwh_total, 200.0);
        assert_eq!(db.count_bills(&filter).unwrap(), 2);

        let processing = BillFilter {
            parse_status: Some(ParseStatus::Processing),
            limit: 100,
            ..BillFilter::default()
        };
        assert_eq!(db.count_bills(&processing).unwrap(), 1);

        let everyone = BillFilter {
            limit: 100,
            ..BillFilter::default()
        };
        assert_eq!(db.count_bills(&everyone).unwrap(), 4);
    }

    #[test]
    fn test_previous_successful_bill() {
        let db = Database::in_memory().unwrap();
        let user = create_user(&db, "asha");
        let jan = db
            .create_manual_bill(user.id, &manual_bill(date(2024, 1, 1), date(2024, 1, 31), 200.0, 1600.0))
            .unwrap();
        let feb = db
            .create_manual_bill(user.id, &manual_bill(date(2024, 2, 1), date(2024, 2, 29), 300.0, 2400.0))
            .unwrap();
        let failed = db
            .create_manual_bill(user.id, &manual_bill(date(2024, 1, 15), date(2024, 2, 10), 50.0, 400.0))
            .unwrap();
        db.set_bill_status(failed.id, ParseStatus::Failed).unwrap();

        let prev = db
            .previous_successful_bill(user.id, feb.billing_period_start, feb.id)
            .unwrap()
            .unwrap();
        assert_eq!(prev.id, jan.id);
        assert!(db
            .previous_successful_bill(user.id, jan.billing_period_start, jan.id)
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_fail_stuck_bills() {
        let db = Database::in_memory().unwrap();
        let user = create_user(&db, "asha");
        let stuck = db
            .create_placeholder_bill(user.id, "s3://greenspark-bills/u/a.pdf")
            .unwrap();

        assert!(db
            .fail_stuck_bills(Utc::now() - Duration::minutes(30))
            .unwrap()
            .is_empty());

        let failed = db.fail_stuck_bills(Utc::now() + Duration::minutes(1)).unwrap();
        assert_eq!(failed, vec![stuck.id]);
        assert_eq!(
            db.get_bill(stuck.id).unwrap().unwrap().parse_status,
            ParseStatus::Failed
        );
    }

    #[test]
    fn test_catalog_seed_and_crud() {
        let db = Database::in_memory().unwrap();
        let seeded = db.seed_default_catalog().unwrap();
        assert_eq!(seeded, default_catalog().len());
        assert_eq!(db.seed_default_catalog().unwrap(), 0);

        let entries = db.list_catalog(None).unwrap();
        assert_eq!(entries.len(), seeded);

        let entry = db
            .create_catalog_entry(&NewCatalogEntry {
                category_id: "aquarium_pump".to_string(),
                label: "Aquarium Pump".to_string(),
                icon_emoji: "🐟".to_string(),
                typical_wattage: 25,
            })
            .unwrap();
        assert_eq!(db.get_catalog_entry("aquarium_pump").unwrap(), Some(entry));
        assert_eq!(db.list_catalog(Some("aquarium")).unwrap().len(), 1);

        let duplicate_label = NewCatalogEntry {
            category_id: "pump_2".to_string(),
            label: "Aquarium Pump".to_string(),
            icon_emoji: "🐟".to_string(),
            typical_wattage: 30,
        };
        assert!(matches!(
            db.create_catalog_entry(&duplicate_label),
            Err(Error::Conflict(_))
        ));

        assert!(db.delete_catalog_entry("aquarium_pump").unwrap());
        assert!(!db.delete_catalog_entry("aquarium_pump").unwrap());
    }

    #[test]
    fn test_appliance_crud_with_catalog_wattage() {
        let db = Database::in_memory().unwrap();
        db.seed_default_catalog().unwrap();
        let catalog = db.list_catalog(None).unwrap();
        let entry = &catalog[0];
        let user = create_user(&db, "asha");

        let linked = db
            .create_appliance(user.id, &new_appliance("Bedroom", Some(&entry.category_id), None))
            .unwrap();
        assert_eq!(linked.catalog_wattage, Some(entry.typical_wattage));
        assert_eq!(linked.effective_wattage(), Some(entry.typical_wattage));

        assert!(matches!(
            db.create_appliance(user.id, &new_appliance("Bedroom", None, Some(60))),
            Err(Error::Conflict(_))
        ));

        let updated = db
            .update_appliance(
                linked.id,
                &ApplianceUpdate {
                    custom_wattage: Some(90),
                    hours_per_day: Some(6.5),
                    ..ApplianceUpdate::default()
                },
            )
            .unwrap();
        assert_eq!(updated.effective_wattage(), Some(90));
        assert_eq!(updated.hours_per_day, 6.5);
        assert_eq!(updated.custom_name, "Bedroom");

        assert!(matches!(
            db.update_appliance(uuid::Uuid::new_v4(), &ApplianceUpdate::default()),
            Err(Error::NotFound(_))
        ));

        assert!(db.delete_appliance(linked.id).unwrap());
        assert!(db.get_appliance(linked.id).unwrap().is_none());
    }

    #[test]
    fn test_create_appliances_is_atomic() {
        let db = Database::in_memory().unwrap();
        let user = create_user(&db, "asha");
        db.create_appliance(user.id, &new_appliance("Fan", None, Some(75)))
            .unwrap();

        let batch = vec![
            new_appliance("TV", None, Some(120)),
            new_appliance("Fan", None, Some(75)),
        ];
        assert!(db.create_appliances(user.id, &batch).is_err());
        assert_eq!(db.list_user_appliances(user.id).unwrap().len(), 1);

        let batch = vec![
            new_appliance("TV", None, Some(120)),
            new_appliance("Geyser", None, Some(2000)),
        ];
        assert_eq!(db.create_appliances(user.id, &batch).unwrap().len(), 2);
        assert_eq!(db.list_user_appliances(user.id).unwrap().len(), 3);
    }

    #[test]
    fn test_list_appliances_filters() {
        let db = Database::in_memory().unwrap();
        let asha = create_user(&db, "asha");
        let ravi = create_user(&db, "ravi");
        db.create_appliance(asha.id, &new_appliance("Living Room Fan", None, Some(75)))
            .unwrap();
        db.create_appliance(asha.id, &new_appliance("Bedroom AC", None, Some(1500)))
            .unwrap();
        db.create_appliance(ravi.id, &new_appliance("Fridge", None, Some(200)))
            .unwrap();

        let filter = ApplianceFilter {
            user_id: Some(asha.id),
            sort_by: Some("custom_name".to_string()),
            sort_order: Some("asc".to_string()),
            limit: 10,
            ..ApplianceFilter::default()
        };
        let listed = db.list_appliances(&filter).unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].custom_name, "Bedroom AC");
        assert_eq!(db.count_appliances(&filter).unwrap(), 2);

        let search = ApplianceFilter {
            search: Some("fan".to_string()),
            limit: 10,
            ..ApplianceFilter::default()
        };
        assert_eq!(db.count_appliances(&search).unwrap(), 1);

        assert_eq!(db.list_all_appliances().unwrap().len(), 3);
        assert_eq!(db.count_users_with_appliances().unwrap(), 2);
    }

    #[test]
    fn test_bulk_operations_respect_owner() {
        let db = Database::in_memory().unwrap();
        let asha = create_user(&db, "asha");
        let ravi = create_user(&db, "ravi");
        let mine = db
            .create_appliance(asha.id, &new_appliance("Fan", None, Some(75)))
            .unwrap();
        let theirs = db
            .create_appliance(ravi.id, &new_appliance("Fan", None, Some(75)))
            .unwrap();

        let update = ApplianceUpdate {
            count: Some(3),
            ..ApplianceUpdate::default()
        };
        let updated = db
            .bulk_update_appliances(
                Some(asha.id),
                &[(mine.id, update.clone()), (theirs.id, update)],
            )
            .unwrap();
        assert_eq!(updated, vec![mine.id]);
        assert_eq!(db.get_appliance(mine.id).unwrap().unwrap().count, 3);
        assert_eq!(db.get_appliance(theirs.id).unwrap().unwrap().count, 1);

        let deleted = db
            .bulk_delete_appliances(Some(asha.id), &[mine.id, theirs.id])
            .unwrap();
        assert_eq!(deleted, vec![mine.id]);
        assert!(db.get_appliance(theirs.id).unwrap().is_some());

        // admins act without an owner scope
        let deleted = db.bulk_delete_appliances(None, &[theirs.id]).unwrap();
        assert_eq!(deleted, vec![theirs.id]);
    }

    #[test]
    fn test_estimates_replace_and_cascade() {
        let db = Database::in_memory().unwrap();
        let user = create_user(&db, "asha");
        let fan = db
            .create_appliance(user.id, &new_appliance("Fan", None, Some(75)))
            .unwrap();
        let tv = db
            .create_appliance(user.id, &new_appliance("TV", None, Some(120)))
            .unwrap();
        let bill = db
            .create_manual_bill(user.id, &manual_bill(date(2024, 1, 1), date(2024, 1, 31), 100.0, 800.0))
            .unwrap();

        let estimate = |appliance: &UserAppliance, kwh: f64| ApplianceEstimate {
            id: uuid::Uuid::new_v4(),
            bill_id: bill.id,
            user_appliance_id: appliance.id,
            estimated_kwh: kwh,
            estimated_cost: kwh * 8.0,
        };

        db.replace_estimates(bill.id, &[estimate(&fan, 40.0), estimate(&tv, 60.0)])
            .unwrap();
        let listed = db.list_estimates(bill.id).unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].appliance_name, "TV");

        db.replace_estimates(bill.id, &[estimate(&fan, 100.0)]).unwrap();
        let listed = db.list_estimates(bill.id).unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].estimate.estimated_kwh, 100.0);

        assert_eq!(db.bills_estimating(&[fan.id, tv.id]).unwrap(), vec![bill.id]);
        assert!(db.bills_estimating(&[tv.id]).unwrap().is_empty());

        db.create_pending_insight(bill.id, user.id).unwrap();
        assert!(db.delete_bill(bill.id).unwrap());
        assert!(db.list_estimates(bill.id).unwrap().is_empty());
        assert!(db.get_insight(bill.id).unwrap().is_none());
    }

    #[test]
    fn test_insight_lifecycle() {
        let db = Database::in_memory().unwrap();
        let user = create_user(&db, "asha");
        let bill = db
            .create_manual_bill(user.id, &manual_bill(date(2024, 1, 1), date(2024, 1, 31), 100.0, 800.0))
            .unwrap();

        let (insight, created) = db.create_pending_insight(bill.id, user.id).unwrap();
        assert!(created);
        assert_eq!(insight.status, InsightStatus::Pending);
        assert!(insight.structured_data.is_none());

        let (again, created) = db.create_pending_insight(bill.id, user.id).unwrap();
        assert!(!created);
        assert_eq!(again.id, insight.id);

        let done = db
            .complete_insight(bill.id, user.id, &serde_json::json!({"recommendations": []}))
            .unwrap();
        assert_eq!(done.id, insight.id);
        assert_eq!(done.status, InsightStatus::Completed);
        assert!(done.generated_at.is_some());

        db.fail_insight(bill.id).unwrap();
        assert_eq!(
            db.get_insight(bill.id).unwrap().unwrap().status,
            InsightStatus::Failed
        );
    }

    #[test]
    fn test_deleting_user_cascades() {
        let db = Database::in_memory().unwrap();
        let user = create_user(&db, "asha");
        let appliance = db
            .create_appliance(user.id, &new_appliance("Fan", None, Some(75)))
            .unwrap();
        let bill = db
            .create_manual_bill(user.id, &manual_bill(date(2024, 1, 1), date(2024, 1, 31), 100.0, 800.0))
            .unwrap();

        db.delete_user(user.id).unwrap();
        assert!(db.get_appliance(appliance.id).unwrap().is_none());
        assert!(db.get_bill(bill.id).unwrap().is_none());
    }

    #[test]
    fn test_encrypted_database() {
        use std::fs;

        let test_path = std::env::temp_dir().join("greenspark_test_encrypted.db");
        let test_path = test_path.to_string_lossy().to_string();
        let _ = fs::remove_file(&test_path);

        {
            let db = Database::new_with_key(&test_path, Some("test-passphrase")).unwrap();
            create_user(&db, "asha");
        }

        {
            let db = Database::new_with_key(&test_path, Some("test-passphrase")).unwrap();
            assert_eq!(db.count_users(&UserFilter::default()).unwrap(), 1);
        }

        assert!(
            Database::new_with_key(&test_path, None).is_err(),
            "Should fail to open encrypted db without key"
        );
        assert!(
            Database::new_with_key(&test_path, Some("wrong-passphrase")).is_err(),
            "Should fail to open encrypted db with wrong key"
        );

        let _ = fs::remove_file(&test_path);
    }

    #[test]
    fn test_key_derivation_is_deterministic() {
        let key1 = derive_key("my-secret").unwrap();
        let key2 = derive_key("my-secret").unwrap();
        assert_eq!(key1, key2);

        let key3 = derive_key("other-secret").unwrap();
        assert_ne!(key1, key3);
    }
}
