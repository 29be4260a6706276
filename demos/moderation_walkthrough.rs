//! Walks an article and a comment through moderation.
//!
//! Shows the read models staying in step with each store, a concurrency
//! conflict between two moderators, and a read model catching up on history
//! it never saw.
//!
//! Run with: `RUST_LOG=moderation_core=debug cargo run --example moderation_walkthrough --features test-util`

use moderation::{
    Context, Repository, RepositoryError,
    article::{
        ApprovePrivate, Article, ArticleCreated, CreateArticle, PublishArticle, RejectArticle,
        SubmitArticle,
    },
    comment::{Comment, CreateComment, DeleteComment, RestoreComment},
    read_model::{ArticleProjection, ArticleViews, CommentProjection, CommentViews},
    store::inmemory,
    test::RepositoryTestExt,
};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let articles = ArticleViews::new();
    let comments = CommentViews::new();
    let repo = Repository::new(inmemory::Store::new())
        .with_projection(ArticleProjection, articles.clone())
        .with_projection(CommentProjection, comments.clone());

    let author = Uuid::new_v4();
    let admin = Uuid::new_v4();
    let article_id = Uuid::new_v4();
    let ctx = Context::correlated("walkthrough");

    // =========================================================================
    // Article review cycle
    // =========================================================================
    println!("=== Article ===");
    repo.execute::<Article, _>(
        &article_id,
        &CreateArticle {
            title: "Event sourcing in practice".to_string(),
            content: "Streams, versions and projections.".to_string(),
            author_id: author,
        },
        &ctx,
    )
    .await?;
    repo.execute::<Article, _>(&article_id, &SubmitArticle { actor_id: author }, &ctx)
        .await?;
    repo.execute::<Article, _>(
        &article_id,
        &RejectArticle {
            feedback: "Add a worked example.".to_string(),
            actor_id: admin,
        },
        &ctx,
    )
    .await?;
    let view = articles.require(&article_id)?;
    println!(
        "v{}: {} ({:?})",
        view.version,
        view.row.state,
        view.row.feedback
    );

    repo.execute::<Article, _>(&article_id, &SubmitArticle { actor_id: author }, &ctx)
        .await?;
    repo.execute::<Article, _>(&article_id, &ApprovePrivate { actor_id: admin }, &ctx)
        .await?;
    let view = articles.require(&article_id)?;
    println!(
        "v{}: {} ({:?})",
        view.version,
        view.row.state,
        view.row.feedback
    );

    // Approving twice is refused by the state machine.
    if let Err(error) = repo
        .execute::<Article, _>(&article_id, &ApprovePrivate { actor_id: admin }, &ctx)
        .await
    {
        println!("refused: {error}");
    }

    // =========================================================================
    // Comment delete and restore
    // =========================================================================
    println!("\n=== Comment ===");
    let comment_id = Uuid::new_v4();
    let visitor = Uuid::new_v4();
    repo.execute::<Comment, _>(
        &comment_id,
        &CreateComment {
            article_id,
            text: "hi".to_string(),
            author_id: visitor,
        },
        &ctx,
    )
    .await?;
    repo.execute::<Comment, _>(&comment_id, &DeleteComment { actor_id: visitor }, &ctx)
        .await?;
    repo.execute::<Comment, _>(&comment_id, &RestoreComment { actor_id: visitor }, &ctx)
        .await?;
    let view = comments.require(&comment_id)?;
    println!("v{}: {} on {}", view.version, view.row.state, view.row.article_id);

    // =========================================================================
    // Two moderators race
    // =========================================================================
    println!("\n=== Concurrency ===");
    let contested = Uuid::new_v4();
    repo.execute::<Article, _>(
        &contested,
        &CreateArticle {
            title: "Contested".to_string(),
            content: "Two moderators, one article.".to_string(),
            author_id: author,
        },
        &ctx,
    )
    .await?;
    repo.execute::<Article, _>(&contested, &SubmitArticle { actor_id: author }, &ctx)
        .await?;

    let mut first = repo.load::<Article>(&contested).await?;
    let mut second = repo.load::<Article>(&contested).await?;
    first.execute(&PublishArticle { actor_id: admin })?;
    second.execute(&RejectArticle {
        feedback: "Too short.".to_string(),
        actor_id: admin,
    })?;

    repo.save(&mut first).await?;
    match repo.save(&mut second).await {
        Err(RepositoryError::Conflict(conflict)) => println!("second moderator: {conflict}"),
        other => println!("unexpected: {other:?}"),
    }
    println!("final state: {}", articles.require(&contested)?.row.state);

    // =========================================================================
    // Catching up a read model
    // =========================================================================
    println!("\n=== Catch-up ===");
    let imported = Uuid::new_v4();
    // Imported history skips the projections.
    repo.seed_events::<Article>(
        &imported,
        vec![
            ArticleCreated {
                title: "Imported".to_string(),
                content: "From the old system.".to_string(),
                author_id: author,
            }
            .into(),
        ],
    )
    .await?;
    println!("view before: {:?}", articles.row(&imported).map(|row| row.state));

    // The next store finds the view behind the stream and replays the backlog.
    let mut root = repo.load::<Article>(&imported).await?;
    root.execute(&SubmitArticle { actor_id: author })?;
    let version = repo.save(&mut root).await?;
    println!(
        "v{version}: {}",
        articles.require(&imported)?.row.state
    );

    // Redelivery skips everything the view already holds.
    let version = repo.redeliver::<Article>(&imported).await?;
    println!("redelivered to v{version}: unchanged");

    Ok(())
}
