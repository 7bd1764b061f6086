use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use blog_identity::{
    AppState, Collaborators,
    cache::RedisCache,
    config::Config,
    database::{PgArticleStore, PgUserStore},
    mail::{LogMailSender, MailSender, SmtpMailSender},
    publish::{ChannelPublisher, EventPublisher, IndexSyncWorker, RedisStreamPublisher},
    routes,
    search::{ElasticIndex, MemoryIndex, SearchIndex},
};
use sqlx::Executor;
use sqlx::postgres::PgPoolOptions;
#[cfg(debug_assertions)]
use tower_http::cors::CorsLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    // 初始化日志
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // 加载配置
    let config = Config::from_env().expect("Failed to load configuration");

    // 设置数据库连接池
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .after_connect(|conn, _meta| {
            Box::pin(async move {
                conn.execute("SET application_name = 'blog_identity';")
                    .await?;
                Ok(())
            })
        })
        .connect(&config.database_url)
        .await
        .expect("Failed to connect to Postgres");
    sqlx::migrate!()
        .run(&pool)
        .await
        .expect("Failed to run migrations");

    // 设置 Redis
    let redis_client =
        redis::Client::open(config.redis_url.clone()).expect("Failed to create Redis client");
    let cache = RedisCache::connect(&redis_client, config.cache_timeout())
        .await
        .expect("Failed to connect to Redis");

    let mail: Arc<dyn MailSender> = match &config.smtp_url {
        Some(url) => Arc::new(
            SmtpMailSender::new(url, &config.mail_from).expect("Invalid SMTP configuration"),
        ),
        None => {
            tracing::warn!("SMTP_URL not set, verification codes will only be logged");
            Arc::new(LogMailSender)
        }
    };

    let users = Arc::new(PgUserStore::new(pool.clone()));
    let articles = Arc::new(PgArticleStore::new(pool));

    // 外部索引走 Redis Stream 消费组；进程内索引直接用通道
    let (index, publisher): (Arc<dyn SearchIndex>, Arc<dyn EventPublisher>) =
        match &config.search_url {
            Some(url) => {
                let index: Arc<dyn SearchIndex> = Arc::new(
                    ElasticIndex::new(url, &config.search_index, config.index_timeout())
                        .expect("Failed to create search index client"),
                );
                let publisher = RedisStreamPublisher::connect(&redis_client, &config.event_stream)
                    .await
                    .expect("Failed to connect event publisher");
                let consumer_conn = redis_client
                    .get_multiplexed_async_connection()
                    .await
                    .expect("Failed to connect index sync worker");

                let worker =
                    IndexSyncWorker::new(articles.clone(), index.clone(), config.index_timeout());
                tokio::spawn(worker.run_stream(
                    consumer_conn,
                    config.event_stream.clone(),
                    format!("worker-{}", uuid::Uuid::new_v4()),
                ));
                let publisher: Arc<dyn EventPublisher> = Arc::new(publisher);
                (index, publisher)
            }
            None => {
                tracing::info!("SEARCH_URL not set, using in-process search index");
                let index: Arc<dyn SearchIndex> = Arc::new(MemoryIndex::new());
                let (publisher, rx) = ChannelPublisher::new(1024);

                let worker =
                    IndexSyncWorker::new(articles.clone(), index.clone(), config.index_timeout());
                tokio::spawn(worker.run_channel(rx));
                let publisher: Arc<dyn EventPublisher> = Arc::new(publisher);
                (index, publisher)
            }
        };

    // 设置应用状态
    let state = AppState::new(
        config,
        Collaborators {
            cache: Arc::new(cache),
            users,
            articles,
            index,
            mail,
            publisher,
        },
    );

    let router = routes::router(state.clone());

    // 根据编译模式决定是否添加CORS
    #[cfg(debug_assertions)]
    let router = {
        tracing::debug!("Adding CORS layer for development mode");
        router.layer(CorsLayer::permissive())
    };

    // 启动服务器
    let addr = SocketAddr::new(
        state.config.server_host.parse().unwrap_or_else(|_| {
            tracing::warn!("Invalid server_host, falling back to dual-stack default");
            IpAddr::V6(std::net::Ipv6Addr::UNSPECIFIED)
        }),
        state.config.server_port,
    );
    tracing::info!("Server listening on {}", addr);
    axum::serve(
        tokio::net::TcpListener::bind(&addr)
            .await
            .expect("Failed to bind"),
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .expect("Failed to start server");
}
