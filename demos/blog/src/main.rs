//! Blog demo: three resources, one pivot, the full command shell.
//!
//! ```bash
//! DB_DATABASE=blog cargo run -p semitexa-demo-blog -- status
//! DB_DATABASE=blog cargo run -p semitexa-demo-blog -- sync
//! DB_DATABASE=blog cargo run -p semitexa-demo-blog -- seed
//! ```

use semitexa_cli::CliApp;
use semitexa_core::prelude::*;

#[derive(Resource, Debug, Clone, Default)]
#[resource(table = "authors")]
struct Author {
    #[column(type = "int")]
    #[primary_key]
    id: Option<i64>,

    #[column(type = "varchar", length = 255)]
    #[filterable]
    email: String,

    #[column(type = "varchar", length = 255)]
    name: String,

    #[column(type = "boolean", default = true)]
    active: bool,

    #[has_many(foreign_key = "author_id")]
    posts: Vec<Post>,
}

#[derive(Resource, Debug, Clone, Default)]
#[resource(table = "posts")]
#[resource_index(columns = "author_id,published_at")]
struct Post {
    #[column(type = "int")]
    #[primary_key]
    id: Option<i64>,

    #[column(type = "int")]
    author_id: Option<i64>,

    #[column(type = "varchar", length = 255)]
    #[filterable]
    title: String,

    #[column(type = "mediumtext", nullable)]
    body: Option<String>,

    #[column(type = "datetime", nullable)]
    #[filterable]
    published_at: Option<chrono::NaiveDateTime>,

    #[belongs_to(foreign_key = "author_id")]
    author: Option<Author>,

    #[many_to_many(pivot = "post_tags", foreign_key = "post_id", related_key = "tag_id")]
    tags: Vec<Tag>,
}

#[derive(Resource, Debug, Clone, Default)]
#[resource(table = "tags")]
struct Tag {
    #[column(type = "int")]
    #[primary_key(strategy = "manual")]
    id: Option<i64>,

    #[column(type = "varchar", length = 64)]
    #[filterable]
    label: String,
}

impl Seeder for Tag {
    fn defaults() -> Vec<Self> {
        ["rust", "mysql", "orm"]
            .iter()
            .enumerate()
            .map(|(i, label)| Tag { id: Some(i as i64 + 1), label: label.to_string() })
            .collect()
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let app = CliApp::from_env()?
        .register::<Author>()
        .register::<Post>()
        .register::<Tag>()
        .seed::<Tag>();
    std::process::exit(semitexa_cli::run(app).await?);
}
