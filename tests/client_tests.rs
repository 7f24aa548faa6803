//! Integration tests for the client
//!
//! These run every delegate operation against a real SQLite database:
//! - CRUD, defaults and constraint errors
//! - Pagination, distinct and relation filters
//! - Aggregates and group by
//! - Interactive transactions
//! - Raw queries and schema sync

use std::time::Duration;

use assert_matches::assert_matches;
use chrono::{TimeZone, Utc};
use pretty_assertions::assert_eq;

use authdb::models::*;
use authdb::orm::{
    Aggregate, Condition, Data, Filter, FindMany, GroupBy, Having, OrderBy, Unique, Update, Value,
};
use authdb::{Client, ClientConfig, ClientError, ErrorKind, IsolationLevel, TransactionOptions};

async fn client() -> Client {
    let client = Client::connect(ClientConfig::in_memory()).await.unwrap();
    let result = client.push_schema().await;
    assert!(result.errors.is_empty(), "{:?}", result.errors);
    client
}

async fn create_user(client: &Client, name: &str, email: &str) -> User {
    client
        .user()
        .create(
            Data::new()
                .set(UserField::Name, name)
                .set(UserField::Email, email),
        )
        .await
        .unwrap()
}

async fn create_session(client: &Client, user: &User, token: &str, agent: Option<&str>) -> Session {
    client
        .session()
        .create(
            Data::new()
                .set(SessionField::UserId, user.id.as_str())
                .set(SessionField::Token, token)
                .set(SessionField::UserAgent, agent)
                .set(
                    SessionField::ExpiresAt,
                    Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap(),
                ),
        )
        .await
        .unwrap()
}

async fn seed_users(client: &Client, count: usize) -> Vec<User> {
    let mut users = Vec::new();
    for i in 0..count {
        users.push(create_user(client, &format!("u{}", i), &format!("u{}@example.com", i)).await);
    }
    users
}

fn names(users: &[User]) -> Vec<String> {
    users.iter().map(|u| u.name.clone()).collect()
}

// ============================================================================
// CRUD
// ============================================================================

mod crud {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_create_applies_defaults() {
        let client = client().await;
        let user = create_user(&client, "Ada", "ada@example.com").await;

        assert_eq!(user.id.len(), 36);
        assert_eq!(user.name, "Ada");
        assert!(!user.email_verified);
        assert!(!user.banned);
        assert_eq!(user.image, None);
        assert_eq!(user.created_at, user.updated_at);
    }

    #[tokio::test]
    async fn test_find_unique_by_id_and_unique_field() {
        let client = client().await;
        let user = create_user(&client, "Ada", "ada@example.com").await;

        let by_id = client
            .user()
            .find_unique(Unique::new(UserField::Id, user.id.as_str()))
            .await
            .unwrap();
        assert_eq!(by_id.as_ref(), Some(&user));

        let by_email = client
            .user()
            .find_unique(Unique::new(UserField::Email, "ada@example.com"))
            .await
            .unwrap();
        assert_eq!(by_email, Some(user));

        let missing = client
            .user()
            .find_unique(Unique::new(UserField::Email, "nobody@example.com"))
            .await
            .unwrap();
        assert_eq!(missing, None);
    }

    #[tokio::test]
    async fn test_find_unique_rejects_non_unique_field() {
        let client = client().await;
        let err = client
            .user()
            .find_unique(Unique::new(UserField::Name, "Ada"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[tokio::test]
    async fn test_or_throw_variants() {
        let client = client().await;

        let err = client
            .user()
            .find_unique_or_throw(Unique::new(UserField::Email, "nobody@example.com"))
            .await
            .unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(err.code(), Some("P2025"));

        let err = client
            .user()
            .find_first_or_throw(FindMany::new().filter(Filter::eq(UserField::Name, "nobody")))
            .await
            .unwrap_err();
        assert_matches!(err, ClientError::RecordNotFound { model: "User", .. });
    }

    #[tokio::test]
    async fn test_create_validates_arguments() {
        let client = client().await;

        let err = client
            .user()
            .create(Data::new().set(UserField::Name, "Ada"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(err.to_string().contains("email"));

        let err = client
            .user()
            .create(
                Data::new()
                    .set(UserField::Name, "Ada")
                    .set(UserField::Email, "ada@example.com")
                    .set(UserField::EmailVerified, "yes"),
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        // nothing reached the database
        let count = client.user().count(FindMany::new()).await.unwrap();
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn test_every_column_kind_round_trips() {
        let client = client().await;
        let user = create_user(&client, "Ada", "ada@example.com").await;
        let period_end = Utc.with_ymd_and_hms(2031, 6, 30, 12, 30, 15).unwrap();

        let subscription = client
            .subscription()
            .create(
                Data::new()
                    .set(SubscriptionField::Plan, "pro")
                    .set(SubscriptionField::ReferenceId, user.id.as_str())
                    .set(SubscriptionField::Status, "active")
                    .set(SubscriptionField::Seats, 5i64)
                    .set(SubscriptionField::CancelAtPeriodEnd, true)
                    .set(SubscriptionField::PeriodEnd, period_end),
            )
            .await
            .unwrap();

        let found = client
            .subscription()
            .find_unique_or_throw(Unique::new(SubscriptionField::Id, subscription.id.as_str()))
            .await
            .unwrap();
        assert_eq!(found.seats, Some(5));
        assert!(found.cancel_at_period_end);
        assert_eq!(found.period_end, Some(period_end));
        assert_eq!(found.period_start, None);
        assert!(found.is_active());
    }

    #[tokio::test]
    async fn test_update_and_arithmetic() {
        let client = client().await;
        let user = create_user(&client, "Ada", "ada@example.com").await;
        let passkey = client
            .passkey()
            .create(
                Data::new()
                    .set(PasskeyField::PublicKey, "pk")
                    .set(PasskeyField::UserId, user.id.as_str())
                    .set(PasskeyField::CredentialId, "cred-1")
                    .set(PasskeyField::DeviceType, "singleDevice"),
            )
            .await
            .unwrap();
        assert_eq!(passkey.counter, 0);

        let passkey = client
            .passkey()
            .update(
                Unique::new(PasskeyField::CredentialId, "cred-1"),
                Update::new()
                    .increment(PasskeyField::Counter, 5i64)
                    .set(PasskeyField::Name, "laptop"),
            )
            .await
            .unwrap();
        assert_eq!(passkey.counter, 5);
        assert_eq!(passkey.name.as_deref(), Some("laptop"));

        let passkey = client
            .passkey()
            .update(
                Unique::new(PasskeyField::CredentialId, "cred-1"),
                Update::new()
                    .multiply(PasskeyField::Counter, 3i64)
                    .set_null(PasskeyField::Name),
            )
            .await
            .unwrap();
        assert_eq!(passkey.counter, 15);
        assert_eq!(passkey.name, None);

        let err = client
            .passkey()
            .update(
                Unique::new(PasskeyField::CredentialId, "cred-1"),
                Update::new().increment(PasskeyField::DeviceType, 1i64),
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[tokio::test]
    async fn test_update_touches_updated_at() {
        let client = client().await;
        let user = create_user(&client, "Ada", "ada@example.com").await;
        tokio::time::sleep(Duration::from_millis(5)).await;

        let updated = client
            .user()
            .update(
                Unique::new(UserField::Id, user.id.as_str()),
                Update::new().set(UserField::Name, "Ada L."),
            )
            .await
            .unwrap();
        assert_eq!(updated.name, "Ada L.");
        assert_eq!(updated.created_at, user.created_at);
        assert!(updated.updated_at > user.updated_at);
    }

    #[tokio::test]
    async fn test_update_and_delete_missing_record() {
        let client = client().await;

        let err = client
            .user()
            .update(
                Unique::new(UserField::Email, "nobody@example.com"),
                Update::new().set(UserField::Name, "x"),
            )
            .await
            .unwrap_err();
        assert_matches!(err, ClientError::RecordNotFound { model: "User", operation: "update" });

        let err = client
            .user()
            .delete(Unique::new(UserField::Email, "nobody@example.com"))
            .await
            .unwrap_err();
        assert_matches!(err, ClientError::RecordNotFound { model: "User", operation: "delete" });
    }

    #[tokio::test]
    async fn test_many_operations() {
        let client = client().await;
        seed_users(&client, 4).await;

        let updated = client
            .user()
            .update_many(
                Filter::in_list(UserField::Name, ["u0", "u1"]),
                Update::new().set(UserField::EmailVerified, true),
            )
            .await
            .unwrap();
        assert_eq!(updated, 2);

        let verified = client
            .user()
            .count(FindMany::new().filter(Filter::eq(UserField::EmailVerified, true)))
            .await
            .unwrap();
        assert_eq!(verified, 2);

        let deleted = client
            .user()
            .delete_many(Filter::eq(UserField::EmailVerified, false))
            .await
            .unwrap();
        assert_eq!(deleted, 2);

        let deleted = client
            .user()
            .delete(Unique::new(UserField::Email, "u0@example.com"))
            .await
            .unwrap();
        assert_eq!(deleted.name, "u0");
        assert_eq!(client.user().count(FindMany::new()).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_create_many() {
        let client = client().await;
        create_user(&client, "existing", "dup@example.com").await;

        let rows = |emails: &[&str]| {
            emails
                .iter()
                .map(|email| {
                    Data::new()
                        .set(UserField::Name, "batch")
                        .set(UserField::Email, *email)
                })
                .collect::<Vec<_>>()
        };

        let inserted = client
            .user()
            .create_many(rows(&["a@example.com", "dup@example.com", "b@example.com"]), true)
            .await
            .unwrap();
        assert_eq!(inserted, 2);

        // without skip_duplicates the whole batch is rolled back
        let err = client
            .user()
            .create_many(rows(&["c@example.com", "dup@example.com"]), false)
            .await
            .unwrap_err();
        assert_matches!(err, ClientError::UniqueConstraint { .. });

        let batch = client
            .user()
            .count(FindMany::new().filter(Filter::eq(UserField::Name, "batch")))
            .await
            .unwrap();
        assert_eq!(batch, 2);
    }

    #[tokio::test]
    async fn test_select_projects_fields() {
        let client = client().await;
        create_user(&client, "Ada", "ada@example.com").await;

        let records = client
            .user()
            .find_many_select(FindMany::new(), &[UserField::Email, UserField::Name])
            .await
            .unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].len(), 2);
        assert_eq!(
            records[0].get(UserField::Email),
            Some(&Value::Text("ada@example.com".to_string()))
        );
        assert_eq!(records[0].get(UserField::Id), None);

        let json = serde_json::to_value(&records[0]).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"email": "ada@example.com", "name": "Ada"})
        );

        let err = client
            .user()
            .find_many_select(FindMany::new(), &[])
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }
}

// ============================================================================
// Constraints
// ============================================================================

mod constraints {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_unique_violation() {
        let client = client().await;
        create_user(&client, "Ada", "ada@example.com").await;

        let err = client
            .user()
            .create(
                Data::new()
                    .set(UserField::Name, "Other")
                    .set(UserField::Email, "ada@example.com"),
            )
            .await
            .unwrap_err();
        assert_matches!(
            &err,
            ClientError::UniqueConstraint { model: "User", fields } if fields == &vec!["email".to_string()]
        );
        assert_eq!(err.code(), Some("P2002"));
        assert_eq!(err.kind(), ErrorKind::KnownRequest);
    }

    #[tokio::test]
    async fn test_foreign_key_violation() {
        let client = client().await;

        let err = client
            .session()
            .create(
                Data::new()
                    .set(SessionField::UserId, "missing-user")
                    .set(SessionField::Token, "t")
                    .set(SessionField::ExpiresAt, Utc::now()),
            )
            .await
            .unwrap_err();
        assert_matches!(err, ClientError::ForeignKeyConstraint { model: "Session", .. });
    }

    #[tokio::test]
    async fn test_delete_cascades() {
        let client = client().await;
        let user = create_user(&client, "Ada", "ada@example.com").await;
        create_session(&client, &user, "t1", None).await;
        create_session(&client, &user, "t2", None).await;
        client
            .user_profile()
            .create(
                Data::new()
                    .set(UserProfileField::UserId, user.id.as_str())
                    .set(UserProfileField::Bio, "hello"),
            )
            .await
            .unwrap();

        client
            .user()
            .delete(Unique::new(UserField::Id, user.id.as_str()))
            .await
            .unwrap();

        assert_eq!(client.session().count(FindMany::new()).await.unwrap(), 0);
        assert_eq!(client.user_profile().count(FindMany::new()).await.unwrap(), 0);
    }
}

// ============================================================================
// Upsert
// ============================================================================

mod upsert {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_native_upsert_on_unique_field() {
        let client = client().await;
        let create = || {
            Data::new()
                .set(UserField::Name, "Ada")
                .set(UserField::Email, "ada@example.com")
        };

        let first = client
            .user()
            .upsert(
                Unique::new(UserField::Email, "ada@example.com"),
                create(),
                Update::new().set(UserField::Name, "Updated"),
            )
            .await
            .unwrap();
        assert_eq!(first.name, "Ada");

        let second = client
            .user()
            .upsert(
                Unique::new(UserField::Email, "ada@example.com"),
                create(),
                Update::new().set(UserField::Name, "Updated"),
            )
            .await
            .unwrap();
        assert_eq!(second.id, first.id);
        assert_eq!(second.name, "Updated");
        assert_eq!(client.user().count(FindMany::new()).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_fallback_upsert_when_create_omits_key() {
        let client = client().await;
        let existing = create_user(&client, "Ada", "ada@example.com").await;

        let updated = client
            .user()
            .upsert(
                Unique::new(UserField::Id, existing.id.as_str()),
                Data::new()
                    .set(UserField::Name, "New")
                    .set(UserField::Email, "new@example.com"),
                Update::new().set(UserField::Image, "avatar.png"),
            )
            .await
            .unwrap();
        assert_eq!(updated.id, existing.id);
        assert_eq!(updated.image.as_deref(), Some("avatar.png"));

        let created = client
            .user()
            .upsert(
                Unique::new(UserField::Id, "not-there"),
                Data::new()
                    .set(UserField::Name, "New")
                    .set(UserField::Email, "new@example.com"),
                Update::new().set(UserField::Image, "avatar.png"),
            )
            .await
            .unwrap();
        assert_ne!(created.id, existing.id);
        assert_eq!(created.email, "new@example.com");
        assert_eq!(created.image, None);
        assert_eq!(client.user().count(FindMany::new()).await.unwrap(), 2);
    }
}

// ============================================================================
// Reads: ordering, pagination and distinct
// ============================================================================

mod pagination {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_skip_take() {
        let client = client().await;
        seed_users(&client, 5).await;

        let page = client
            .user()
            .find_many(
                FindMany::new()
                    .order_by(OrderBy::asc(UserField::Name))
                    .skip(1)
                    .take(2),
            )
            .await
            .unwrap();
        assert_eq!(names(&page), vec!["u1", "u2"]);

        let rest = client
            .user()
            .find_many(FindMany::new().order_by(OrderBy::desc(UserField::Name)).skip(3))
            .await
            .unwrap();
        assert_eq!(names(&rest), vec!["u1", "u0"]);

        let err = client
            .user()
            .find_many(FindMany::new().skip(-1))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[tokio::test]
    async fn test_cursor_includes_cursor_record() {
        let client = client().await;
        seed_users(&client, 5).await;

        let page = client
            .user()
            .find_many(
                FindMany::new()
                    .order_by(OrderBy::asc(UserField::Name))
                    .cursor(Unique::new(UserField::Email, "u2@example.com"))
                    .take(2),
            )
            .await
            .unwrap();
        assert_eq!(names(&page), vec!["u2", "u3"]);

        let next = client
            .user()
            .find_many(
                FindMany::new()
                    .order_by(OrderBy::asc(UserField::Name))
                    .cursor(Unique::new(UserField::Email, "u3@example.com"))
                    .skip(1)
                    .take(2),
            )
            .await
            .unwrap();
        assert_eq!(names(&next), vec!["u4"]);

        let gone = client
            .user()
            .find_many(
                FindMany::new()
                    .order_by(OrderBy::asc(UserField::Name))
                    .cursor(Unique::new(UserField::Email, "missing@example.com")),
            )
            .await
            .unwrap();
        assert!(gone.is_empty());
    }

    #[tokio::test]
    async fn test_negative_take_reads_backwards() {
        let client = client().await;
        seed_users(&client, 5).await;

        let last = client
            .user()
            .find_many(FindMany::new().order_by(OrderBy::asc(UserField::Name)).take(-2))
            .await
            .unwrap();
        assert_eq!(names(&last), vec!["u3", "u4"]);

        let before = client
            .user()
            .find_many(
                FindMany::new()
                    .order_by(OrderBy::asc(UserField::Name))
                    .cursor(Unique::new(UserField::Email, "u2@example.com"))
                    .take(-2),
            )
            .await
            .unwrap();
        assert_eq!(names(&before), vec!["u1", "u2"]);
    }

    #[tokio::test]
    async fn test_take_min_returns_everything() {
        let client = client().await;
        seed_users(&client, 3).await;

        let all = client
            .user()
            .find_many(FindMany::new().order_by(OrderBy::asc(UserField::Name)).take(i64::MIN))
            .await
            .unwrap();
        assert_eq!(names(&all), vec!["u0", "u1", "u2"]);

        let count = client
            .user()
            .count(FindMany::new().take(i64::MIN))
            .await
            .unwrap();
        assert_eq!(count, 3);
    }

    #[tokio::test]
    async fn test_count_honors_cursor_skip_and_take() {
        let client = client().await;
        seed_users(&client, 5).await;

        let count = |args: FindMany<UserField>| {
            let client = client.clone();
            async move {
                client
                    .user()
                    .count(args.order_by(OrderBy::asc(UserField::Name)))
                    .await
                    .unwrap()
            }
        };

        assert_eq!(count(FindMany::new().skip(1).take(3)).await, 3);
        assert_eq!(count(FindMany::new().skip(4)).await, 1);
        assert_eq!(
            count(FindMany::new().cursor(Unique::new(UserField::Email, "u3@example.com"))).await,
            2
        );
        assert_eq!(
            count(
                FindMany::new()
                    .cursor(Unique::new(UserField::Email, "u2@example.com"))
                    .take(-2)
            )
            .await,
            2
        );
        assert_eq!(
            count(FindMany::new().cursor(Unique::new(UserField::Email, "missing@example.com")))
                .await,
            0
        );
    }

    #[tokio::test]
    async fn test_nulls_ordering() {
        let client = client().await;
        let users = seed_users(&client, 3).await;
        client
            .user()
            .update(
                Unique::new(UserField::Id, users[1].id.as_str()),
                Update::new().set(UserField::Image, "b.png"),
            )
            .await
            .unwrap();

        let first = client
            .user()
            .find_first(FindMany::new().order_by(OrderBy::asc(UserField::Image).nulls_last()))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(first.name, "u1");

        let first = client
            .user()
            .find_first(
                FindMany::new()
                    .order_by(OrderBy::asc(UserField::Image).nulls_first())
                    .order_by(OrderBy::asc(UserField::Name)),
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(first.name, "u0");
    }

    #[tokio::test]
    async fn test_distinct() {
        let client = client().await;
        let user = create_user(&client, "Ada", "ada@example.com").await;
        create_session(&client, &user, "t1", Some("curl/8.0")).await;
        create_session(&client, &user, "t2", Some("Firefox")).await;
        create_session(&client, &user, "t3", Some("curl/8.0")).await;
        create_session(&client, &user, "t4", None).await;

        let sessions = client
            .session()
            .find_many(
                FindMany::new()
                    .order_by(OrderBy::asc(SessionField::Token))
                    .distinct([SessionField::UserAgent]),
            )
            .await
            .unwrap();
        let tokens: Vec<&str> = sessions.iter().map(|s| s.token.as_str()).collect();
        assert_eq!(tokens, vec!["t1", "t2", "t4"]);

        let count = client
            .session()
            .count(FindMany::new().distinct([SessionField::UserAgent]))
            .await
            .unwrap();
        assert_eq!(count, 3);
    }

    #[tokio::test]
    async fn test_string_filters() {
        let client = client().await;
        create_user(&client, "Ada Lovelace", "ada@example.com").await;
        create_user(&client, "Grace Hopper", "grace@navy.mil").await;
        create_user(&client, "100%_done", "pct@example.com").await;

        let count = |filter: Filter<UserField>| {
            let client = client.clone();
            async move { client.user().count(FindMany::new().filter(filter)).await.unwrap() }
        };

        assert_eq!(count(Filter::contains(UserField::Name, "love")).await, 1);
        assert_eq!(count(Filter::starts_with(UserField::Email, "GRACE")).await, 1);
        assert_eq!(count(Filter::ends_with(UserField::Email, "@example.com")).await, 2);
        assert_eq!(count(Filter::contains(UserField::Name, "%_")).await, 1);
        assert_eq!(
            count(Filter::not(Filter::contains(UserField::Email, "example"))).await,
            1
        );
        assert_eq!(count(Filter::or([])).await, 0);
        assert_eq!(count(Filter::and([])).await, 3);
    }
}

// ============================================================================
// Aggregates
// ============================================================================

mod aggregates {
    use super::*;
    use pretty_assertions::assert_eq;

    async fn seed_passkeys(client: &Client) -> (User, User) {
        let ada = create_user(client, "Ada", "ada@example.com").await;
        let bob = create_user(client, "Bob", "bob@example.com").await;
        for (user, credential, counter) in [
            (&ada, "c1", 1i64),
            (&ada, "c2", 2),
            (&ada, "c3", 3),
            (&bob, "c4", 10),
        ] {
            client
                .passkey()
                .create(
                    Data::new()
                        .set(PasskeyField::PublicKey, "pk")
                        .set(PasskeyField::UserId, user.id.as_str())
                        .set(PasskeyField::CredentialId, credential)
                        .set(PasskeyField::DeviceType, "multiDevice")
                        .set(PasskeyField::Counter, counter),
                )
                .await
                .unwrap();
        }
        (ada, bob)
    }

    #[tokio::test]
    async fn test_aggregate() {
        let client = client().await;
        let (ada, _) = seed_passkeys(&client).await;

        let result = client
            .passkey()
            .aggregate(
                Aggregate::new()
                    .filter(Filter::eq(PasskeyField::UserId, ada.id.as_str()))
                    .count_all()
                    .count(PasskeyField::Name)
                    .sum(PasskeyField::Counter)
                    .avg(PasskeyField::Counter)
                    .min(PasskeyField::Counter)
                    .max(PasskeyField::Counter),
            )
            .await
            .unwrap();

        assert_eq!(result.count_all, Some(3));
        assert_eq!(result.count.get(&PasskeyField::Name), Some(&0));
        assert_eq!(result.sum_of(PasskeyField::Counter), Some(&Value::Int(6)));
        assert_eq!(result.avg_f64(PasskeyField::Counter), Some(2.0));
        assert_eq!(result.min.get(&PasskeyField::Counter), Some(&Value::Int(1)));
        assert_eq!(result.max.get(&PasskeyField::Counter), Some(&Value::Int(3)));
    }

    #[tokio::test]
    async fn test_aggregate_over_paginated_window() {
        let client = client().await;
        seed_passkeys(&client).await;

        let top = client
            .passkey()
            .aggregate(
                Aggregate::new()
                    .window(
                        FindMany::new()
                            .order_by(OrderBy::desc(PasskeyField::Counter))
                            .take(2),
                    )
                    .count_all()
                    .sum(PasskeyField::Counter),
            )
            .await
            .unwrap();
        assert_eq!(top.count_all, Some(2));
        assert_eq!(top.sum_of(PasskeyField::Counter), Some(&Value::Int(13)));

        let next = client
            .passkey()
            .aggregate(
                Aggregate::new()
                    .window(
                        FindMany::new()
                            .order_by(OrderBy::desc(PasskeyField::Counter))
                            .skip(1)
                            .take(2),
                    )
                    .min(PasskeyField::Counter)
                    .max(PasskeyField::Counter),
            )
            .await
            .unwrap();
        assert_eq!(next.min.get(&PasskeyField::Counter), Some(&Value::Int(2)));
        assert_eq!(next.max.get(&PasskeyField::Counter), Some(&Value::Int(3)));
    }

    #[tokio::test]
    async fn test_aggregate_over_empty_window() {
        let client = client().await;

        let result = client
            .passkey()
            .aggregate(Aggregate::new().count_all().sum(PasskeyField::Counter))
            .await
            .unwrap();
        assert_eq!(result.count_all, Some(0));
        assert_eq!(result.sum_of(PasskeyField::Counter), Some(&Value::Null));
    }

    #[tokio::test]
    async fn test_aggregate_rejects_non_numeric_avg() {
        let client = client().await;
        let err = client
            .passkey()
            .aggregate(Aggregate::new().avg(PasskeyField::DeviceType))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[tokio::test]
    async fn test_group_by_with_having() {
        let client = client().await;
        let (ada, bob) = seed_passkeys(&client).await;

        let groups = client
            .passkey()
            .group_by(
                GroupBy::new([PasskeyField::UserId])
                    .count_all()
                    .sum(PasskeyField::Counter)
                    .order_by(OrderBy::asc(PasskeyField::UserId)),
            )
            .await
            .unwrap();
        assert_eq!(groups.len(), 2);
        let ada_group = groups
            .iter()
            .find(|g| g.get(PasskeyField::UserId) == Some(&Value::Text(ada.id.clone())))
            .unwrap();
        assert_eq!(ada_group.count_all(), Some(3));
        assert_eq!(
            ada_group.aggregates.sum_of(PasskeyField::Counter),
            Some(&Value::Int(6))
        );

        let busy = client
            .passkey()
            .group_by(
                GroupBy::new([PasskeyField::UserId])
                    .count_all()
                    .having(Having::count_all(Condition::Gt(Value::Int(1)))),
            )
            .await
            .unwrap();
        assert_eq!(busy.len(), 1);
        assert_eq!(
            busy[0].get(PasskeyField::UserId),
            Some(&Value::Text(ada.id.clone()))
        );

        let high = client
            .passkey()
            .group_by(
                GroupBy::new([PasskeyField::UserId])
                    .having(Having::sum(PasskeyField::Counter, Condition::Gte(Value::Int(10)))),
            )
            .await
            .unwrap();
        assert_eq!(high.len(), 1);
        assert_eq!(
            high[0].get(PasskeyField::UserId),
            Some(&Value::Text(bob.id.clone()))
        );
    }

    #[tokio::test]
    async fn test_group_by_skip_take() {
        let client = client().await;
        let (ada, bob) = seed_passkeys(&client).await;
        let (second, second_count) = if ada.id > bob.id { (&ada, 3) } else { (&bob, 1) };

        let groups = client
            .passkey()
            .group_by(
                GroupBy::new([PasskeyField::UserId])
                    .count_all()
                    .order_by(OrderBy::asc(PasskeyField::UserId))
                    .skip(1)
                    .take(1),
            )
            .await
            .unwrap();
        assert_eq!(groups.len(), 1);
        assert_eq!(
            groups[0].get(PasskeyField::UserId),
            Some(&Value::Text(second.id.clone()))
        );
        assert_eq!(groups[0].count_all(), Some(second_count));

        let err = client
            .passkey()
            .group_by(
                GroupBy::new([PasskeyField::UserId])
                    .order_by(OrderBy::asc(PasskeyField::UserId))
                    .take(-1),
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[tokio::test]
    async fn test_group_by_validation() {
        let client = client().await;

        let err = client
            .passkey()
            .group_by(GroupBy::new([]))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        let err = client
            .passkey()
            .group_by(
                GroupBy::new([PasskeyField::UserId]).order_by(OrderBy::asc(PasskeyField::Counter)),
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }
}

// ============================================================================
// Relations
// ============================================================================

mod relations {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_include_has_many_and_has_one() {
        let client = client().await;
        let ada = create_user(&client, "Ada", "ada@example.com").await;
        let bob = create_user(&client, "Bob", "bob@example.com").await;
        create_session(&client, &ada, "t1", None).await;
        create_session(&client, &ada, "t2", None).await;
        client
            .user_profile()
            .create(
                Data::new()
                    .set(UserProfileField::UserId, bob.id.as_str())
                    .set(UserProfileField::DisplayName, "bobby"),
            )
            .await
            .unwrap();

        let users = client
            .user()
            .find_many_with(
                FindMany::new().order_by(OrderBy::asc(UserField::Name)),
                User::SESSIONS,
            )
            .await
            .unwrap();
        assert_eq!(users.len(), 2);
        assert_eq!(users[0].1.len(), 2);
        assert!(users[1].1.is_empty());

        let (user, profile) = client
            .user()
            .find_unique_with(Unique::new(UserField::Id, bob.id.as_str()), User::PROFILE)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(user.id, bob.id);
        assert_eq!(profile.unwrap().display_name.as_deref(), Some("bobby"));

        let (_, profile) = client
            .user()
            .find_first_with(
                FindMany::new().filter(Filter::eq(UserField::Id, ada.id.as_str())),
                User::PROFILE,
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(profile, None);
    }

    #[tokio::test]
    async fn test_include_belongs_to() {
        let client = client().await;
        let ada = create_user(&client, "Ada", "ada@example.com").await;
        create_session(&client, &ada, "t1", None).await;

        let sessions = client
            .session()
            .find_many_with(FindMany::new(), Session::USER)
            .await
            .unwrap();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].1.as_ref().map(|u| u.id.as_str()), Some(ada.id.as_str()));
    }

    #[tokio::test]
    async fn test_relation_filters() {
        let client = client().await;
        let ada = create_user(&client, "Ada", "ada@example.com").await;
        let bob = create_user(&client, "Bob", "bob@example.com").await;
        create_user(&client, "Cy", "cy@example.com").await;
        create_session(&client, &ada, "t1", Some("curl/8.0")).await;
        create_session(&client, &ada, "t2", Some("Firefox")).await;
        create_session(&client, &bob, "t3", Some("curl/7.0")).await;

        let find = |filter: Filter<UserField>| {
            let client = client.clone();
            async move {
                let users = client
                    .user()
                    .find_many(
                        FindMany::new()
                            .filter(filter)
                            .order_by(OrderBy::asc(UserField::Name)),
                    )
                    .await
                    .unwrap();
                names(&users)
            }
        };

        assert_eq!(
            find(Filter::some(
                User::SESSIONS,
                Filter::starts_with(SessionField::UserAgent, "curl")
            ))
            .await,
            vec!["Ada", "Bob"]
        );
        // vacuously true for users without sessions
        assert_eq!(
            find(Filter::every(
                User::SESSIONS,
                Filter::starts_with(SessionField::UserAgent, "curl")
            ))
            .await,
            vec!["Bob", "Cy"]
        );
        assert_eq!(
            find(Filter::none(User::SESSIONS, Filter::and([]))).await,
            vec!["Cy"]
        );

        let sessions = client
            .session()
            .count(FindMany::new().filter(Filter::is(
                Session::USER,
                Filter::eq(UserField::Name, "Ada"),
            )))
            .await
            .unwrap();
        assert_eq!(sessions, 2);
    }
}

// ============================================================================
// Transactions
// ============================================================================

mod transactions {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_commit() {
        let client = client().await;

        let user = client
            .transaction(None, |tx| {
                Box::pin(async move {
                    let user = tx
                        .user()
                        .create(
                            Data::new()
                                .set(UserField::Name, "Ada")
                                .set(UserField::Email, "ada@example.com"),
                        )
                        .await?;
                    tx.session()
                        .create(
                            Data::new()
                                .set(SessionField::UserId, user.id.as_str())
                                .set(SessionField::Token, "t1")
                                .set(SessionField::ExpiresAt, Utc::now()),
                        )
                        .await?;
                    Ok(user)
                })
            })
            .await
            .unwrap();

        let sessions = client
            .session()
            .count(FindMany::new().filter(Filter::eq(SessionField::UserId, user.id.as_str())))
            .await
            .unwrap();
        assert_eq!(sessions, 1);
    }

    #[tokio::test]
    async fn test_error_rolls_back() {
        let client = client().await;

        let err = client
            .transaction(None, |tx| {
                Box::pin(async move {
                    tx.user()
                        .create(
                            Data::new()
                                .set(UserField::Name, "Ada")
                                .set(UserField::Email, "ada@example.com"),
                        )
                        .await?;
                    Err::<(), _>(ClientError::Validation("abort".to_string()))
                })
            })
            .await
            .unwrap_err();
        assert_matches!(err, ClientError::Validation(message) if message == "abort");
        assert_eq!(client.user().count(FindMany::new()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_timeout_expires_transaction() {
        let client = client().await;
        let options = TransactionOptions::default().timeout(Duration::from_millis(50));

        let err = client
            .transaction(Some(options), |tx| {
                Box::pin(async move {
                    tx.user()
                        .create(
                            Data::new()
                                .set(UserField::Name, "Ada")
                                .set(UserField::Email, "ada@example.com"),
                        )
                        .await?;
                    tokio::time::sleep(Duration::from_millis(500)).await;
                    Ok(())
                })
            })
            .await
            .unwrap_err();
        assert_matches!(err, ClientError::TransactionExpired { timeout_ms: 50 });
        assert_eq!(err.code(), Some("P2028"));
        assert_eq!(client.user().count(FindMany::new()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_start_timeout_when_pool_is_busy() {
        let client = client().await;
        let held = client.begin(None).await.unwrap();

        let options = TransactionOptions::default().max_wait(Duration::from_millis(50));
        let err = client.begin(Some(options)).await.unwrap_err();
        assert_matches!(err, ClientError::TransactionStartTimeout { max_wait_ms: 50 });
        assert!(err.is_transient());

        held.rollback().await.unwrap();
        let tx = client.begin(None).await.unwrap();
        tx.commit().await.unwrap();
    }

    #[tokio::test]
    async fn test_manual_transaction() {
        let client = client().await;

        let mut tx = client
            .begin(Some(
                TransactionOptions::default().isolation_level(IsolationLevel::ReadCommitted),
            ))
            .await
            .unwrap();
        assert_eq!(tx.isolation_level(), IsolationLevel::ReadCommitted);
        assert!(tx.is_open());
        tx.user()
            .create(
                Data::new()
                    .set(UserField::Name, "Ada")
                    .set(UserField::Email, "ada@example.com"),
            )
            .await
            .unwrap();
        let rows = tx
            .query_raw("SELECT COUNT(*) AS n FROM \"user\"", vec![])
            .await
            .unwrap();
        assert_eq!(rows[0].get("n"), Some(&Value::Int(1)));
        tx.rollback().await.unwrap();

        assert_eq!(client.user().count(FindMany::new()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_dropped_transaction_rolls_back() {
        let client = client().await;

        {
            let mut tx = client.begin(None).await.unwrap();
            tx.user()
                .create(
                    Data::new()
                        .set(UserField::Name, "Ada")
                        .set(UserField::Email, "ada@example.com"),
                )
                .await
                .unwrap();
        }

        assert_eq!(client.user().count(FindMany::new()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_read_uncommitted_is_reset_on_release() {
        let client = client().await;
        let options = TransactionOptions::default().isolation_level(IsolationLevel::ReadUncommitted);
        let pragma = "PRAGMA read_uncommitted";

        let mut tx = client.begin(Some(options)).await.unwrap();
        let rows = tx.query_raw(pragma, vec![]).await.unwrap();
        assert_eq!(rows[0].get("read_uncommitted"), Some(&Value::Int(1)));
        tx.commit().await.unwrap();

        let rows = client.query_raw(pragma, vec![]).await.unwrap();
        assert_eq!(rows[0].get("read_uncommitted"), Some(&Value::Int(0)));

        {
            let mut tx = client.begin(Some(options)).await.unwrap();
            tx.user()
                .create(
                    Data::new()
                        .set(UserField::Name, "Ada")
                        .set(UserField::Email, "ada@example.com"),
                )
                .await
                .unwrap();
        }

        let rows = client.query_raw(pragma, vec![]).await.unwrap();
        assert_eq!(rows[0].get("read_uncommitted"), Some(&Value::Int(0)));
        assert_eq!(client.user().count(FindMany::new()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_uncommitted_writes_are_invisible_to_other_connections() {
        let dir = tempfile::tempdir().unwrap();
        let mut config =
            ClientConfig::new(format!("sqlite:{}", dir.path().join("auth.db").display()));
        config.max_connections = 2;
        let client = Client::connect(config).await.unwrap();
        assert!(client.push_schema().await.errors.is_empty());

        let mut tx = client.begin(None).await.unwrap();
        tx.user()
            .create(
                Data::new()
                    .set(UserField::Name, "Ada")
                    .set(UserField::Email, "ada@example.com"),
            )
            .await
            .unwrap();

        assert_eq!(client.user().count(FindMany::new()).await.unwrap(), 0);
        tx.commit().await.unwrap();
        assert_eq!(client.user().count(FindMany::new()).await.unwrap(), 1);

        client.disconnect().await;
        assert!(!client.is_connected());
    }
}

// ============================================================================
// Raw SQL and schema
// ============================================================================

mod raw_and_schema {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_raw_queries() {
        let client = client().await;
        create_user(&client, "Ada", "ada@example.com").await;

        let affected = client
            .execute_raw(
                "UPDATE \"user\" SET \"name\" = ? WHERE \"email\" = ?",
                vec![Value::from("Ada L."), Value::from("ada@example.com")],
            )
            .await
            .unwrap();
        assert_eq!(affected, 1);

        let rows = client
            .query_raw(
                "SELECT \"name\", \"email_verified\", \"image\" FROM \"user\" WHERE \"email\" = ?",
                vec![Value::from("ada@example.com")],
            )
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].columns(), ["name", "email_verified", "image"]);
        assert_eq!(rows[0].get("name"), Some(&Value::Text("Ada L.".to_string())));
        assert_eq!(rows[0].get("email_verified"), Some(&Value::Int(0)));
        assert_eq!(rows[0].get("image"), Some(&Value::Null));

        let err = client
            .query_raw("SELECT * FROM \"no_such_table\"", vec![])
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnknownRequest);
    }

    #[tokio::test]
    async fn test_push_schema_is_idempotent() {
        let client = client().await;
        let again = client.push_schema().await;
        assert!(again.errors.is_empty());
        assert!(again.is_unchanged());
    }

    #[tokio::test]
    async fn test_row_counts() {
        let client = client().await;
        create_user(&client, "Ada", "ada@example.com").await;

        let counts = client.row_counts().await.unwrap();
        assert_eq!(counts.len(), 14);
        assert_eq!(counts[0], ("User", 1));
        assert!(counts[1..].iter().all(|(_, count)| *count == 0));
    }
}
