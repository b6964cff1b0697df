mod common;

use std::collections::HashSet;

use anyhow::{anyhow, Result};
use common::{acquire_db_lock, TestApp};
use diesel::Connection;
use servicecrm::numbering::{generate, DISPATCH_ORDER_PREFIX, INSTALLATION_JOB_PREFIX};
use tokio::task::JoinSet;

#[tokio::test]
async fn concurrent_allocations_never_repeat_a_number() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let Some(app) = TestApp::new().await? else {
        return Ok(());
    };
    let org = app.insert_organization("Acme", false, false).await?;

    let mut allocators = JoinSet::new();
    for _ in 0..12 {
        let state = app.state.clone();
        allocators.spawn_blocking(move || -> Result<String> {
            let mut conn = state.db().map_err(|err| anyhow!("{err:?}"))?;
            let number = conn.transaction(|conn| generate(conn, DISPATCH_ORDER_PREFIX, org, "2425"))?;
            Ok(number)
        });
    }

    let mut numbers = HashSet::new();
    while let Some(joined) = allocators.join_next().await {
        numbers.insert(joined??);
    }
    let expected: HashSet<String> = (1..=12).map(|n| format!("DO/2425/{n:05}")).collect();
    assert_eq!(numbers, expected);

    app.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn sequences_are_independent_per_prefix_year_and_organization() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let Some(app) = TestApp::new().await? else {
        return Ok(());
    };
    let acme = app.insert_organization("Acme", false, false).await?;
    let rival = app.insert_organization("Rival", false, false).await?;

    let mut conn = app.state.db().map_err(|err| anyhow!("{err:?}"))?;
    assert_eq!(generate(&mut conn, DISPATCH_ORDER_PREFIX, acme, "2425")?, "DO/2425/00001");
    assert_eq!(generate(&mut conn, DISPATCH_ORDER_PREFIX, acme, "2425")?, "DO/2425/00002");
    assert_eq!(generate(&mut conn, INSTALLATION_JOB_PREFIX, acme, "2425")?, "IJ/2425/00001");
    assert_eq!(generate(&mut conn, DISPATCH_ORDER_PREFIX, acme, "2526")?, "DO/2526/00001");
    assert_eq!(generate(&mut conn, DISPATCH_ORDER_PREFIX, rival, "2425")?, "DO/2425/00001");
    drop(conn);

    app.cleanup().await?;
    Ok(())
}
