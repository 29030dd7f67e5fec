use crate::errors::AppError;
use crate::settings::PlatformSettings;
use deadpool_diesel::postgres::Pool;
use diesel::result::Error as DieselError;
use tracing::log::{debug, error};

pub(super) async fn run_query<T, F>(pool: &Pool, query: F) -> Result<T, AppError>
where
    F: FnOnce(&mut diesel::PgConnection) -> Result<T, DieselError> + Send + 'static,
    T: Send + 'static,
{
    let conn = pool.get().await?;
    debug!("DB connection object obtained from pool for interaction");

    match conn.interact(query).await? {
        Ok(result) => Ok(result),
        Err(diesel_err) => {
            if !matches!(diesel_err, DieselError::NotFound) {
                error!("Diesel query failed within interaction: {:?}", diesel_err);
            }
            Err(AppError::from(diesel_err))
        }
    }
}

/// One typed settings snapshot for the current request.
pub(super) async fn load_settings(pool: &Pool) -> Result<PlatformSettings, AppError> {
    run_query(pool, PlatformSettings::load).await
}
