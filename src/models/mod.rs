pub mod audit_log;
pub mod live_races;
pub mod permalink_pools;
pub mod permalinks;
pub mod permissions;
pub mod races;
pub mod tournaments;
pub mod users;

pub(crate) fn epoch_timestamp() -> i64 {
    chrono::Utc::now().timestamp()
}

// TODO: should this be a derive macro?
/// creates a function named `save()` that takes a &SqliteConnection
#[macro_export]
macro_rules! save_fn {
    ($table:expr, $output:ty) => {
        pub fn save(&self, cxn: &mut diesel::SqliteConnection) -> diesel::QueryResult<$output> {
            use diesel::RunQueryDsl;
            diesel::insert_into($table).values(self).get_result(cxn)
        }
    };
}

#[macro_export]
macro_rules! update_fn {
    () => {
        pub fn update(&self, conn: &mut diesel::SqliteConnection) -> diesel::QueryResult<usize> {
            diesel::update(self).set(self).execute(conn)
        }
    };
}
