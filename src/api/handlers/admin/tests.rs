use anyhow::Result;
use axum::http::{Method, StatusCode};
use serde_json::{Value, json};

use super::AdminListQuery;
use crate::api::handlers::harness::{
    Caller, TestApp, admin_session, attach_category, count, free_member, insert_category,
    insert_reservation, insert_restaurant, insert_user, premium_member,
};

fn restaurant_body(name: &str, category_ids: &[i64]) -> Value {
    json!({
        "name": name,
        "description": "味噌煮込みうどんの老舗",
        "lowest_price": 1200,
        "highest_price": 2500,
        "postal_code": "4500002",
        "address": "愛知県名古屋市中村区名駅",
        "opening_time": "11:00",
        "closing_time": "21:00",
        "seating_capacity": 30,
        "category_ids": category_ids,
        "regular_holiday_ids": [1],
    })
}

#[test]
fn list_query_ignores_blank_values() {
    let query = AdminListQuery {
        keyword: Some("  ".to_string()),
        page: Some(0),
    };
    assert_eq!(query.keyword(), None);
    assert_eq!(query.page(), 1);

    let query = AdminListQuery {
        keyword: Some(" 太郎 ".to_string()),
        page: Some(3),
    };
    assert_eq!(query.keyword(), Some("太郎"));
    assert_eq!(query.page(), 3);
}

#[tokio::test]
async fn back_office_requires_an_admin_session() -> Result<()> {
    let Ok(app) = TestApp::start("nagoyameshi-admin").await else {
        return Ok(());
    };
    let (_, member) = premium_member(app.pool(), "member@example.com").await?;

    for uri in ["/v1/admin/home", "/v1/admin/users", "/v1/admin/company"] {
        let guest = app.get(uri, Caller::Guest).await?;
        assert_eq!(guest.status, StatusCode::UNAUTHORIZED, "{uri}");
        let as_member = app.get(uri, Caller::Member(&member)).await?;
        assert_eq!(as_member.status, StatusCode::UNAUTHORIZED, "{uri}");
    }
    Ok(())
}

#[tokio::test]
async fn dashboard_counts_members_and_sales() -> Result<()> {
    let Ok(app) = TestApp::start("nagoyameshi-admin").await else {
        return Ok(());
    };
    let pool = app.pool();
    let admin = admin_session(pool, "admin@example.com").await?;
    let (free_id, _) = free_member(pool, "free@example.com").await?;
    premium_member(pool, "premium-a@example.com").await?;
    premium_member(pool, "premium-b@example.com").await?;
    let restaurant = insert_restaurant(pool, "世界の山ちゃん", 500).await?;
    insert_reservation(pool, restaurant, free_id).await?;

    let home = app.get("/v1/admin/home", Caller::Admin(&admin)).await?;
    assert_eq!(home.status, StatusCode::OK);
    assert_eq!(home.body["total_users"], json!(3));
    assert_eq!(home.body["premium_users"], json!(2));
    assert_eq!(home.body["free_users"], json!(1));
    assert_eq!(home.body["total_restaurants"], json!(1));
    assert_eq!(home.body["total_reservations"], json!(1));
    assert_eq!(home.body["monthly_sales"], json!(600));
    Ok(())
}

#[tokio::test]
async fn users_are_searchable() -> Result<()> {
    let Ok(app) = TestApp::start("nagoyameshi-admin").await else {
        return Ok(());
    };
    let pool = app.pool();
    let admin = admin_session(pool, "admin@example.com").await?;
    let (premium_id, _) = premium_member(pool, "hanako@example.com").await?;
    insert_user(pool, "jiro@example.com", false).await?;

    let all = app.get("/v1/admin/users", Caller::Admin(&admin)).await?;
    assert_eq!(all.body["total"], json!(2));

    let found = app
        .get("/v1/admin/users?keyword=hanako&page=", Caller::Admin(&admin))
        .await?;
    assert_eq!(found.status, StatusCode::OK);
    assert_eq!(found.body["total"], json!(1));
    assert_eq!(found.body["data"][0]["premium"], json!(true));

    let by_kana = app
        .get("/v1/admin/users?keyword=%E3%82%B5%E3%83%A0%E3%83%A9%E3%82%A4", Caller::Admin(&admin))
        .await?;
    assert_eq!(by_kana.body["total"], json!(2));

    let detail = app
        .get(&format!("/v1/admin/users/{premium_id}"), Caller::Admin(&admin))
        .await?;
    assert_eq!(detail.status, StatusCode::OK);
    assert_eq!(detail.body["email"], json!("hanako@example.com"));
    assert_eq!(detail.body["premium"], json!(true));

    let missing = app.get("/v1/admin/users/nope", Caller::Admin(&admin)).await?;
    assert_eq!(missing.status, StatusCode::NOT_FOUND);
    Ok(())
}

#[tokio::test]
async fn restaurant_crud_replaces_relations() -> Result<()> {
    let Ok(app) = TestApp::start("nagoyameshi-admin").await else {
        return Ok(());
    };
    let pool = app.pool();
    let admin = admin_session(pool, "admin@example.com").await?;
    let noodles = insert_category(pool, "うどん").await?;
    let local = insert_category(pool, "名古屋めし").await?;
    let chicken = insert_category(pool, "手羽先").await?;
    let extra = insert_category(pool, "居酒屋").await?;

    let too_many = app
        .send(
            Method::POST,
            "/v1/admin/restaurants",
            Caller::Admin(&admin),
            Some(restaurant_body("山本屋", &[noodles, local, chicken, extra])),
        )
        .await?;
    assert_eq!(too_many.status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(too_many.body["errors"]["category_ids"].is_array());

    let unknown = app
        .send(
            Method::POST,
            "/v1/admin/restaurants",
            Caller::Admin(&admin),
            Some(restaurant_body("山本屋", &[999])),
        )
        .await?;
    assert_eq!(unknown.status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(count(pool, "SELECT COUNT(*) FROM restaurants").await?, 0);

    let created = app
        .send(
            Method::POST,
            "/v1/admin/restaurants",
            Caller::Admin(&admin),
            Some(restaurant_body("山本屋", &[noodles, local])),
        )
        .await?;
    assert_eq!(created.status, StatusCode::CREATED);
    let id = created.body["id"].as_i64().unwrap_or_default();
    assert_eq!(created.body["categories"].as_array().map(Vec::len), Some(2));
    assert_eq!(created.body["regular_holidays"][0]["day"], json!("月"));
    assert_eq!(created.body["opening_time"], json!("11:00"));

    let updated = app
        .send(
            Method::PUT,
            &format!("/v1/admin/restaurants/{id}"),
            Caller::Admin(&admin),
            Some(restaurant_body("山本屋本店", &[chicken])),
        )
        .await?;
    assert_eq!(updated.status, StatusCode::OK);
    assert_eq!(updated.body["name"], json!("山本屋本店"));
    assert_eq!(updated.body["categories"][0]["name"], json!("手羽先"));
    assert_eq!(
        count(pool, "SELECT COUNT(*) FROM category_restaurant").await?,
        1
    );

    let listed = app
        .get("/v1/admin/restaurants?keyword=%E6%9C%AC%E5%BA%97", Caller::Admin(&admin))
        .await?;
    assert_eq!(listed.body["total"], json!(1));

    let deleted = app
        .send(
            Method::DELETE,
            &format!("/v1/admin/restaurants/{id}"),
            Caller::Admin(&admin),
            None,
        )
        .await?;
    assert_eq!(deleted.status, StatusCode::NO_CONTENT);
    let gone = app
        .get(&format!("/v1/admin/restaurants/{id}"), Caller::Admin(&admin))
        .await?;
    assert_eq!(gone.status, StatusCode::NOT_FOUND);
    assert_eq!(
        count(pool, "SELECT COUNT(*) FROM category_restaurant").await?,
        0
    );
    Ok(())
}

#[tokio::test]
async fn category_crud() -> Result<()> {
    let Ok(app) = TestApp::start("nagoyameshi-admin").await else {
        return Ok(());
    };
    let pool = app.pool();
    let admin = admin_session(pool, "admin@example.com").await?;
    let restaurant = insert_restaurant(pool, "矢場とん", 1500).await?;

    let blank = app
        .send(
            Method::POST,
            "/v1/admin/categories",
            Caller::Admin(&admin),
            Some(json!({ "name": "" })),
        )
        .await?;
    assert_eq!(blank.status, StatusCode::UNPROCESSABLE_ENTITY);

    let created = app
        .send(
            Method::POST,
            "/v1/admin/categories",
            Caller::Admin(&admin),
            Some(json!({ "name": "とんかつ" })),
        )
        .await?;
    assert_eq!(created.status, StatusCode::CREATED);
    let id = created.body["id"].as_i64().unwrap_or_default();
    attach_category(pool, restaurant, id).await?;

    let renamed = app
        .send(
            Method::PUT,
            &format!("/v1/admin/categories/{id}"),
            Caller::Admin(&admin),
            Some(json!({ "name": "味噌かつ" })),
        )
        .await?;
    assert_eq!(renamed.status, StatusCode::OK);
    assert_eq!(renamed.body["name"], json!("味噌かつ"));

    let searched = app
        .get("/v1/admin/categories?keyword=%E5%91%B3%E5%99%8C", Caller::Admin(&admin))
        .await?;
    assert_eq!(searched.body["total"], json!(1));

    let deleted = app
        .send(
            Method::DELETE,
            &format!("/v1/admin/categories/{id}"),
            Caller::Admin(&admin),
            None,
        )
        .await?;
    assert_eq!(deleted.status, StatusCode::NO_CONTENT);
    assert_eq!(
        count(pool, "SELECT COUNT(*) FROM category_restaurant").await?,
        0
    );

    let again = app
        .send(
            Method::DELETE,
            &format!("/v1/admin/categories/{id}"),
            Caller::Admin(&admin),
            None,
        )
        .await?;
    assert_eq!(again.status, StatusCode::NOT_FOUND);
    Ok(())
}

#[tokio::test]
async fn company_and_terms_are_editable() -> Result<()> {
    let Ok(app) = TestApp::start("nagoyameshi-admin").await else {
        return Ok(());
    };
    let pool = app.pool();
    let admin = admin_session(pool, "admin@example.com").await?;
    let (_, member) = free_member(pool, "reader@example.com").await?;

    let company = json!({
        "name": "名古屋めし株式会社",
        "postal_code": "4600008",
        "address": "愛知県名古屋市中区栄",
        "representative": "侍 花子",
        "establishment_date": "2020年4月1日",
        "capital": "10,000千円",
        "business": "飲食店情報の提供",
        "number_of_employees": "12名",
    });
    let updated = app
        .send(Method::PUT, "/v1/admin/company", Caller::Admin(&admin), Some(company))
        .await?;
    assert_eq!(updated.status, StatusCode::OK);
    let seen = app.get("/v1/company", Caller::Member(&member)).await?;
    assert_eq!(seen.body["name"], json!("名古屋めし株式会社"));

    let empty = app
        .send(
            Method::PUT,
            "/v1/admin/terms",
            Caller::Admin(&admin),
            Some(json!({ "content": " " })),
        )
        .await?;
    assert_eq!(empty.status, StatusCode::UNPROCESSABLE_ENTITY);

    let terms = app
        .send(
            Method::PUT,
            "/v1/admin/terms",
            Caller::Admin(&admin),
            Some(json!({ "content": "第1条 本規約は改定されました。" })),
        )
        .await?;
    assert_eq!(terms.status, StatusCode::OK);
    let shown = app.get("/v1/admin/terms", Caller::Admin(&admin)).await?;
    assert_eq!(shown.body["content"], json!("第1条 本規約は改定されました。"));
    Ok(())
}
