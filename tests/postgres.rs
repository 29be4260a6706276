//! The moderation workflow on top of the `PostgreSQL` event store.
//!
//! Requires Docker; run with `cargo test --all-features`.

#![cfg(all(feature = "postgres", feature = "test-util"))]

use moderation::{
    Context, Repository, RepositoryError,
    article::{Article, ArticleState, CreateArticle, PublishArticle, SubmitArticle},
    read_model::{ArticleProjection, ArticleViews},
    store::postgres,
};
use sqlx::PgPool;
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::postgres::Postgres;
use uuid::Uuid;

async fn start() -> (ContainerAsync<Postgres>, postgres::Store) {
    let container = Postgres::default().start().await.unwrap();
    let host = container.get_host().await.unwrap();
    let port = container.get_host_port_ipv4(5432).await.unwrap();
    let pool = PgPool::connect(&format!("postgres://postgres:postgres@{host}:{port}/postgres"))
        .await
        .unwrap();
    let store = postgres::Store::new(pool);
    store.migrate().await.unwrap();
    (container, store)
}

#[tokio::test]
async fn article_round_trips_through_postgres() {
    let (_container, store) = start().await;
    let views = ArticleViews::new();
    let repo = Repository::new(store).with_projection(ArticleProjection, views.clone());
    let id = Uuid::new_v4();
    let author = Uuid::new_v4();
    let ctx = Context::correlated("pg-1");

    repo.execute::<Article, _>(
        &id,
        &CreateArticle {
            title: "T1".to_string(),
            content: "C1".to_string(),
            author_id: author,
        },
        &ctx,
    )
    .await
    .unwrap();
    repo.execute::<Article, _>(&id, &SubmitArticle { actor_id: author }, &ctx)
        .await
        .unwrap();
    repo.execute::<Article, _>(&id, &PublishArticle { actor_id: author }, &ctx)
        .await
        .unwrap();

    let article = repo.load_existing::<Article>(&id).await.unwrap();
    assert_eq!(article.version(), 3);
    assert_eq!(article.state().state(), ArticleState::Published);
    assert_eq!(views.require(&id).unwrap().row.state, ArticleState::Published);
}

#[tokio::test]
async fn second_create_already_exists() {
    let (_container, store) = start().await;
    let repo = Repository::new(store);
    let id = Uuid::new_v4();
    let create = CreateArticle {
        title: "T1".to_string(),
        content: "C1".to_string(),
        author_id: Uuid::new_v4(),
    };
    repo.execute::<Article, _>(&id, &create, &Context::default())
        .await
        .unwrap();

    let mut root = moderation::AggregateRoot::<Article>::new(id);
    root.execute(&create).unwrap();
    let err = repo.save(&mut root).await.unwrap_err();

    assert!(matches!(err, RepositoryError::AlreadyExists(_)));
    assert_eq!(repo.load::<Article>(&id).await.unwrap().version(), 1);
}
