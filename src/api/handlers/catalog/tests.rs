//! Catalog listing, filtering and ordering against a real database.

use anyhow::Result;
use axum::http::StatusCode;
use serde_json::{Value, json};

use crate::api::handlers::harness::{
    Caller, TestApp, admin_session, attach_category, free_member, insert_category,
    insert_reservation, insert_restaurant, insert_review,
};

fn names(body: &Value) -> Vec<String> {
    body["restaurants"]["data"]
        .as_array()
        .map(|rows| {
            rows.iter()
                .filter_map(|row| row["name"].as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}

#[tokio::test]
async fn search_filters_combine() -> Result<()> {
    let Ok(app) = TestApp::start("nagoyameshi-catalog").await else {
        return Ok(());
    };
    let pool = app.pool();
    let unagi = insert_category(pool, "うなぎ").await?;
    let miso = insert_category(pool, "味噌煮込みうどん").await?;
    let hitsumabushi = insert_restaurant(pool, "ひつまぶし本店", 4000).await?;
    let cheap_unagi = insert_restaurant(pool, "うな丼亭", 1500).await?;
    let udon = insert_restaurant(pool, "山本屋", 1200).await?;
    attach_category(pool, hitsumabushi, unagi).await?;
    attach_category(pool, cheap_unagi, unagi).await?;
    attach_category(pool, udon, miso).await?;

    let all = app.get("/v1/restaurants", Caller::Guest).await?;
    assert_eq!(all.status, StatusCode::OK);
    assert_eq!(all.body["restaurants"]["total"], json!(3));
    assert_eq!(all.body["sort"], json!("created_at desc"));

    // Keyword matches a category name.
    let by_keyword = app
        .get("/v1/restaurants?keyword=%E5%91%B3%E5%99%8C", Caller::Guest)
        .await?;
    assert_eq!(names(&by_keyword.body), vec!["山本屋".to_string()]);

    let by_category = app
        .get(
            &format!("/v1/restaurants?category_id={unagi}&price=2000"),
            Caller::Guest,
        )
        .await?;
    assert_eq!(names(&by_category.body), vec!["うな丼亭".to_string()]);
    assert_eq!(by_category.body["restaurants"]["total"], json!(1));

    // Empty form fields are ignored.
    let empty = app
        .get("/v1/restaurants?keyword=&category_id=&price=", Caller::Guest)
        .await?;
    assert_eq!(empty.body["restaurants"]["total"], json!(3));
    Ok(())
}

#[tokio::test]
async fn sort_orders() -> Result<()> {
    let Ok(app) = TestApp::start("nagoyameshi-catalog").await else {
        return Ok(());
    };
    let pool = app.pool();
    let (member_id, _) = free_member(pool, "sorter@example.com").await?;
    let first = insert_restaurant(pool, "一番", 3000).await?;
    let second = insert_restaurant(pool, "二番", 1000).await?;
    let third = insert_restaurant(pool, "三番", 2000).await?;
    insert_review(pool, second, member_id, 5).await?;
    insert_review(pool, first, member_id, 2).await?;
    insert_reservation(pool, third, member_id).await?;
    insert_reservation(pool, third, member_id).await?;
    insert_reservation(pool, first, member_id).await?;

    let cheapest = app
        .get("/v1/restaurants?sort=lowest_price%20asc", Caller::Guest)
        .await?;
    assert_eq!(names(&cheapest.body), vec!["二番", "三番", "一番"]);

    let rated = app
        .get("/v1/restaurants?sort=rating%20desc", Caller::Guest)
        .await?;
    assert_eq!(names(&rated.body), vec!["二番", "一番", "三番"]);

    let popular = app
        .get("/v1/restaurants?sort=popular%20desc", Caller::Guest)
        .await?;
    assert_eq!(names(&popular.body), vec!["三番", "一番", "二番"]);

    let unknown = app.get("/v1/restaurants?sort=bogus", Caller::Guest).await?;
    assert_eq!(unknown.body["sort"], json!("created_at desc"));
    assert_eq!(names(&unknown.body), vec!["三番", "二番", "一番"]);
    Ok(())
}

#[tokio::test]
async fn pagination_reports_total() -> Result<()> {
    let Ok(app) = TestApp::start("nagoyameshi-catalog").await else {
        return Ok(());
    };
    for index in 0..17 {
        insert_restaurant(app.pool(), &format!("店{index:02}"), 1000).await?;
    }
    let second = app.get("/v1/restaurants?page=2", Caller::Guest).await?;
    assert_eq!(second.body["restaurants"]["total"], json!(17));
    assert_eq!(second.body["restaurants"]["last_page"], json!(2));
    assert_eq!(names(&second.body).len(), 2);
    Ok(())
}

#[tokio::test]
async fn detail_and_home() -> Result<()> {
    let Ok(app) = TestApp::start("nagoyameshi-catalog").await else {
        return Ok(());
    };
    let pool = app.pool();
    let (member_id, token) = free_member(pool, "viewer@example.com").await?;
    let restaurant = insert_restaurant(pool, "矢場とん", 1500).await?;
    let category = insert_category(pool, "味噌カツ").await?;
    attach_category(pool, restaurant, category).await?;
    insert_review(pool, restaurant, member_id, 4).await?;
    sqlx::query("INSERT INTO restaurant_user (restaurant_id, user_id) VALUES ($1, $2)")
        .bind(restaurant)
        .bind(member_id)
        .execute(pool)
        .await?;

    let guest = app
        .get(&format!("/v1/restaurants/{restaurant}"), Caller::Guest)
        .await?;
    assert_eq!(guest.status, StatusCode::OK);
    assert_eq!(guest.body["is_favorite"], json!(false));
    assert_eq!(guest.body["opening_time"], json!("11:00"));
    assert_eq!(guest.body["categories"][0]["name"], json!("味噌カツ"));
    assert_eq!(guest.body["review_count"], json!(1));

    let member = app
        .get(&format!("/v1/restaurants/{restaurant}"), Caller::Member(&token))
        .await?;
    assert_eq!(member.body["is_favorite"], json!(true));

    let missing = app.get("/v1/restaurants/999999", Caller::Guest).await?;
    assert_eq!(missing.status, StatusCode::NOT_FOUND);

    let home = app.get("/v1/home", Caller::Guest).await?;
    assert_eq!(home.status, StatusCode::OK);
    assert_eq!(home.body["highly_rated_restaurants"][0]["name"], json!("矢場とん"));
    assert_eq!(home.body["categories"].as_array().map(Vec::len), Some(1));

    let holidays = app.get("/v1/regular-holidays", Caller::Guest).await?;
    assert_eq!(holidays.body.as_array().map(Vec::len), Some(9));
    Ok(())
}

#[tokio::test]
async fn admins_are_kept_out_of_the_public_catalog() -> Result<()> {
    let Ok(app) = TestApp::start("nagoyameshi-catalog").await else {
        return Ok(());
    };
    let admin = admin_session(app.pool(), "staff@example.com").await?;
    for uri in ["/v1/home", "/v1/restaurants", "/v1/categories"] {
        let response = app.get(uri, Caller::Admin(&admin)).await?;
        assert_eq!(response.status, StatusCode::FORBIDDEN, "{uri}");
    }
    Ok(())
}
