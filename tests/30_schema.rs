mod common;

use anyhow::Result;
use axum::http::{Method, StatusCode};
use serde_json::{json, Value};

use common::TestApp;

fn posts_schema() -> Value {
    json!({
        "bsonType": "object",
        "properties": {
            "title": { "bsonType": "string" },
            "views": { "bsonType": "int" },
            "tags": { "bsonType": "array" }
        },
        "required": ["title"]
    })
}

#[tokio::test]
async fn writes_missing_required_fields_are_rejected() -> Result<()> {
    let app = TestApp::new();
    let project = app.project_with_collection("blog", "posts", posts_schema()).await?;
    let base = format!("/api/v1/data/{}/posts", project.id);

    let res = app
        .data(Method::POST, &base, &project.api_key, Some(json!({ "body": "no title" })))
        .await?;
    assert_eq!(res.status, StatusCode::BAD_REQUEST);
    assert_eq!(res.body["code"], "VALIDATION_ERROR");
    assert_eq!(res.body["field"], "title");

    let listed = app.data(Method::GET, &base, &project.api_key, None).await?;
    assert_eq!(listed.body, json!([]));

    let created = app
        .data(Method::POST, &base, &project.api_key, Some(json!({ "title": "first", "views": 1 })))
        .await?;
    assert_eq!(created.status, StatusCode::CREATED);
    let id = common::text(&created.body, "_id")?;

    let fetched = app
        .data(Method::GET, &format!("{}/{}", base, id), &project.api_key, None)
        .await?;
    assert_eq!(fetched.body["title"], "first");
    assert_eq!(fetched.body["views"], 1);
    Ok(())
}

#[tokio::test]
async fn replacements_are_validated_too() -> Result<()> {
    let app = TestApp::new();
    let project = app.project_with_collection("blog", "posts", posts_schema()).await?;
    let base = format!("/api/v1/data/{}/posts", project.id);

    let created = app
        .data(Method::POST, &base, &project.api_key, Some(json!({ "title": "kept" })))
        .await?;
    let uri = format!("{}/{}", base, common::text(&created.body, "_id")?);

    let res = app
        .data(Method::PUT, &uri, &project.api_key, Some(json!({ "title": "x", "views": "many" })))
        .await?;
    assert_eq!(res.status, StatusCode::BAD_REQUEST);
    assert_eq!(res.body["field"], "views");

    let fetched = app.data(Method::GET, &uri, &project.api_key, None).await?;
    assert_eq!(fetched.body["title"], "kept");
    Ok(())
}

#[tokio::test]
async fn undeclared_fields_pass_through() -> Result<()> {
    let app = TestApp::new();
    let project = app.project_with_collection("blog", "posts", posts_schema()).await?;

    let res = app
        .data(
            Method::POST,
            &format!("/api/v1/data/{}/posts", project.id),
            &project.api_key,
            Some(json!({ "title": "t", "meta": { "source": "import" } })),
        )
        .await?;
    assert_eq!(res.status, StatusCode::CREATED);
    assert_eq!(res.body["meta"]["source"], "import");
    Ok(())
}

#[tokio::test]
async fn schema_can_be_read_replaced_and_cleared() -> Result<()> {
    let app = TestApp::new();
    let project = app.project_with_collection("blog", "posts", posts_schema()).await?;
    let schema_uri = format!("/api/v1/projects/{}/collections/posts/schema", project.id);
    let data_uri = format!("/api/v1/data/{}/posts", project.id);

    let res = app.request(Method::GET, &schema_uri, None).await?;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.body["collectionName"], "posts");
    assert_eq!(res.body["properties"]["title"]["bsonType"], "string");
    assert_eq!(res.body["required"], json!(["title"]));

    let res = app
        .request(
            Method::PUT,
            &schema_uri,
            Some(json!({ "properties": { "slug": { "bsonType": "string" } }, "required": ["slug"] })),
        )
        .await?;
    assert_eq!(res.status, StatusCode::OK);
    assert!(res.body["properties"].get("title").is_none());

    // the old rule is gone, the new one applies
    let res = app
        .data(Method::POST, &data_uri, &project.api_key, Some(json!({ "title": "t" })))
        .await?;
    assert_eq!(res.status, StatusCode::BAD_REQUEST);
    assert_eq!(res.body["field"], "slug");

    let res = app.request(Method::PUT, &schema_uri, Some(json!({}))).await?;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.body["properties"], json!({}));
    assert_eq!(app.state.schemas.len(), 0);

    let res = app
        .data(Method::POST, &data_uri, &project.api_key, Some(json!({ "anything": true })))
        .await?;
    assert_eq!(res.status, StatusCode::CREATED);
    Ok(())
}

#[tokio::test]
async fn invalid_schema_updates_keep_the_previous_schema() -> Result<()> {
    let app = TestApp::new();
    let project = app.project_with_collection("blog", "posts", posts_schema()).await?;
    let schema_uri = format!("/api/v1/projects/{}/collections/posts/schema", project.id);

    for body in [
        json!({ "bsonType": "array" }),
        json!({ "properties": { "x": { "bsonType": "decimal" } } }),
        json!(["title"]),
    ] {
        let res = app.request(Method::PUT, &schema_uri, Some(body.clone())).await?;
        assert_eq!(res.status, StatusCode::BAD_REQUEST, "accepted {}", body);
    }

    let res = app.request(Method::GET, &schema_uri, None).await?;
    assert_eq!(res.body["required"], json!(["title"]));
    Ok(())
}

#[tokio::test]
async fn dropping_a_collection_forgets_its_schema() -> Result<()> {
    let app = TestApp::new();
    let project = app.project_with_collection("blog", "posts", posts_schema()).await?;
    let schema_uri = format!("/api/v1/projects/{}/collections/posts/schema", project.id);

    app.request(
        Method::DELETE,
        &format!("/api/v1/projects/{}/collections/posts", project.id),
        None,
    )
    .await?;
    assert!(app.state.schemas.get(&project.id, "posts").is_none());

    let res = app.request(Method::GET, &schema_uri, None).await?;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.body["properties"], json!({}));

    // recreated without a schema, writes are unrestricted
    app.create_collection(&project.id, "posts", json!({})).await?;
    app.activate(&project.id, &["posts"]).await?;
    let res = app
        .data(
            Method::POST,
            &format!("/api/v1/data/{}/posts", project.id),
            &project.api_key,
            Some(json!({ "body": "untitled" })),
        )
        .await?;
    assert_eq!(res.status, StatusCode::CREATED);
    Ok(())
}

#[tokio::test]
async fn schemas_are_scoped_per_project() -> Result<()> {
    let app = TestApp::new();
    let strict = app.project_with_collection("blog_a", "posts", posts_schema()).await?;
    let loose = app.project_with_collection("blog_b", "posts", json!({})).await?;

    let res = app
        .data(
            Method::POST,
            &format!("/api/v1/data/{}/posts", loose.id),
            &loose.api_key,
            Some(json!({ "views": "lots" })),
        )
        .await?;
    assert_eq!(res.status, StatusCode::CREATED);

    let res = app
        .data(
            Method::POST,
            &format!("/api/v1/data/{}/posts", strict.id),
            &strict.api_key,
            Some(json!({ "views": "lots" })),
        )
        .await?;
    assert_eq!(res.status, StatusCode::BAD_REQUEST);
    Ok(())
}
