mod common;

use common::FakeDriver;
use pg_middleware::prelude::*;

#[tokio::test]
async fn insert_returning_yields_generated_id() -> Result<(), PgMiddlewareError> {
    let driver = FakeDriver::new().with_table("users", &["id", "name"]);
    let engine = driver.engine();

    let first = engine
        .insert("users", &[("name", RowValues::from("Alice"))], Some("id"))
        .await?;
    let second = engine
        .insert("users", &[("name", RowValues::from("Bob"))], Some("id"))
        .await?;

    assert_eq!(first, Some(RowValues::Int(1)));
    assert_eq!(second, Some(RowValues::Int(2)));
    assert_eq!(
        driver.statements()[0],
        r#"INSERT INTO users ("name") VALUES ($1) RETURNING "id""#
    );
    assert_eq!(
        driver.rows("users"),
        vec![
            vec![RowValues::Int(1), RowValues::from("Alice")],
            vec![RowValues::Int(2), RowValues::from("Bob")],
        ]
    );
    Ok(())
}

#[tokio::test]
async fn insert_without_returning_yields_none() -> Result<(), PgMiddlewareError> {
    let driver = FakeDriver::new().with_table("events", &["id", "kind"]);
    let engine = driver.engine();

    assert_eq!(engine.insert("events", &[], None).await?, None);
    assert_eq!(driver.statements(), ["INSERT INTO events DEFAULT VALUES"]);
    assert_eq!(driver.rows("events").len(), 1);
    Ok(())
}

#[tokio::test]
async fn insert_into_missing_table_names_the_table() {
    let driver = FakeDriver::new();
    let err = driver
        .engine()
        .insert("ghosts", &[("name", RowValues::from("x"))], Some("id"))
        .await
        .unwrap_err();
    assert!(matches!(err, PgMiddlewareError::Query { .. }));
    assert!(err.to_string().contains("ghosts"), "{err}");
    assert_eq!(driver.releases(), 1);
}

#[tokio::test]
async fn insert_with_unknown_returning_column_is_a_query_error() {
    let driver = FakeDriver::new().with_table("users", &["id", "name"]);
    let err = driver
        .engine()
        .insert("users", &[("name", RowValues::from("x"))], Some("uuid"))
        .await
        .unwrap_err();
    assert!(matches!(err, PgMiddlewareError::Query { .. }));
    assert!(err.to_string().contains("users"), "{err}");
}

#[tokio::test]
async fn update_without_conditions_never_reaches_the_pool() {
    let driver = FakeDriver::new().with_table("users", &["id", "name"]);
    let err = driver
        .engine()
        .update("users", &[("name", RowValues::from("x"))], &[])
        .await
        .unwrap_err();
    assert!(matches!(err, PgMiddlewareError::Builder(_)));
    assert_eq!(driver.checkouts(), 0);
}

#[tokio::test]
async fn update_and_upsert_send_built_statements() -> Result<(), PgMiddlewareError> {
    let driver = FakeDriver::new()
        .with_table("prefs", &["key", "value"])
        .with_table("tags", &["name"]);
    let engine = driver.engine();

    engine
        .update(
            "users",
            &[("name", RowValues::from("bob"))],
            &[("id", RowValues::Int(3))],
        )
        .await?;
    engine
        .upsert(
            "prefs",
            &[("value", RowValues::from("dark"))],
            &[("key", RowValues::from("theme"))],
        )
        .await?;
    engine
        .upsert("tags", &[], &[("name", RowValues::from("rust"))])
        .await?;

    assert_eq!(
        driver.statements(),
        [
            r#"UPDATE users SET "name" = $1 WHERE ("id" = $2)"#,
            r#"INSERT INTO prefs ("key", "value") VALUES ($1, $2) ON CONFLICT ("key") DO UPDATE SET "value" = $3"#,
            r#"INSERT INTO tags ("name") VALUES ($1) ON CONFLICT ("name") DO NOTHING"#,
        ]
    );
    Ok(())
}

#[tokio::test]
async fn remove_without_conditions_clears_the_table() -> Result<(), PgMiddlewareError> {
    let driver = FakeDriver::new().with_table("sessions", &["id", "user_id"]);
    let engine = driver.engine();
    for user in 1..=3 {
        engine
            .insert("sessions", &[("user_id", RowValues::Int(user))], None)
            .await?;
    }

    assert_eq!(
        engine
            .remove("sessions", &[("user_id", RowValues::Int(2))])
            .await?,
        0
    );
    assert_eq!(engine.remove("sessions", &[]).await?, 3);
    assert!(driver.rows("sessions").is_empty());

    let statements = driver.statements();
    assert_eq!(
        &statements[statements.len() - 2..],
        [
            r#"DELETE FROM sessions WHERE ("user_id" = $1)"#,
            "DELETE FROM sessions"
        ]
    );
    Ok(())
}
