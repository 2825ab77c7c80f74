use sqlx::{postgres::PgArguments, Error as SqlxError, Executor, FromRow, Postgres};

/// Trait to define the schema of a database object for PostgreSQL.
pub trait SqlxSchema: Send + Sync + Unpin + Clone + std::fmt::Debug {
    /// The type of the primary key for this database object.
    type Id: Send + Sync + Clone + for<'q> sqlx::Encode<'q, Postgres> + sqlx::Type<Postgres>;

    /// The intermediate type that implements FromRow, used for fetching from
    /// the database. Enum-valued columns come back as TEXT on this type and
    /// are narrowed in `from_row`.
    type Row: for<'r> FromRow<'r, sqlx::postgres::PgRow> + Send + Unpin;

    const TABLE_NAME: &'static str;
    const ID_COLUMN_NAME: &'static str;
    const COLUMNS: &'static [&'static str];
    const INDEXES_SQL: &'static [&'static str];

    fn id_column_name() -> &'static str { Self::ID_COLUMN_NAME }
    fn table_name() -> &'static str { Self::TABLE_NAME }
    fn columns() -> &'static [&'static str] { Self::COLUMNS }
    fn indexes_sql() -> &'static [&'static str] { Self::INDEXES_SQL }

    /// Retrieves the value of the primary key for an instance of the object.
    fn get_id_value(&self) -> Self::Id;

    /// Converts the intermediate Row type to the Self type.
    fn from_row(row: Self::Row) -> Self;

    /// DDL for this table. Hand-written per object, executed at startup.
    fn create_table_sql() -> String;

    fn drop_table_sql() -> String {
        format!("DROP TABLE IF EXISTS \"{}\" CASCADE;", Self::TABLE_NAME)
    }

    fn column_list() -> String {
        Self::COLUMNS
            .iter()
            .map(|c| format!("\"{}\"", c))
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn select_all_sql() -> String {
        format!("SELECT {} FROM \"{}\"", Self::column_list(), Self::TABLE_NAME)
    }

    fn select_by_id_sql() -> String {
        format!("{} WHERE \"{}\" = $1", Self::select_all_sql(), Self::ID_COLUMN_NAME)
    }

    fn insert_sql() -> String {
        let placeholders = (1..=Self::COLUMNS.len())
            .map(|i| format!("${}", i))
            .collect::<Vec<_>>()
            .join(", ");
        format!(
            "INSERT INTO \"{}\" ({}) VALUES ({}) RETURNING {}",
            Self::TABLE_NAME,
            Self::column_list(),
            placeholders,
            Self::column_list()
        )
    }

    /// Insert that resolves conflicts on `conflict_column` by overwriting the
    /// existing row with the incoming values (latest write wins). `created_at`
    /// and the primary key of the existing row are left untouched.
    fn upsert_sql(conflict_column: &str) -> String {
        let placeholders = (1..=Self::COLUMNS.len())
            .map(|i| format!("${}", i))
            .collect::<Vec<_>>()
            .join(", ");
        let assignments = Self::COLUMNS
            .iter()
            .filter(|c| **c != Self::ID_COLUMN_NAME && **c != conflict_column && **c != "created_at")
            .map(|c| format!("\"{}\" = EXCLUDED.\"{}\"", c, c))
            .collect::<Vec<_>>()
            .join(", ");
        format!(
            "INSERT INTO \"{}\" ({}) VALUES ({}) ON CONFLICT (\"{}\") DO UPDATE SET {} RETURNING {}",
            Self::TABLE_NAME,
            Self::column_list(),
            placeholders,
            conflict_column,
            assignments,
            Self::column_list()
        )
    }

    fn update_by_id_sql() -> String {
        let non_id: Vec<&&str> = Self::COLUMNS
            .iter()
            .filter(|c| **c != Self::ID_COLUMN_NAME)
            .collect();
        let mut assignments = Vec::with_capacity(non_id.len());
        for (i, c) in non_id.iter().enumerate() {
            assignments.push(format!("\"{}\" = ${}", c, i + 1));
        }
        format!(
            "UPDATE \"{}\" SET {} WHERE \"{}\" = ${} RETURNING {}",
            Self::TABLE_NAME,
            assignments.join(", "),
            Self::ID_COLUMN_NAME,
            non_id.len() + 1,
            Self::column_list()
        )
    }

    fn delete_by_id_sql() -> String {
        format!(
            "DELETE FROM \"{}\" WHERE \"{}\" = $1",
            Self::TABLE_NAME,
            Self::ID_COLUMN_NAME
        )
    }

    /// Keeps `updated_at` fresh on UPDATE, see the trigger function installed
    /// by `init_databases!`.
    fn trigger_sql() -> String {
        format!(
            "DROP TRIGGER IF EXISTS set_updated_at_{t} ON \"{t}\"; CREATE TRIGGER set_updated_at_{t} BEFORE UPDATE ON \"{t}\" FOR EACH ROW EXECUTE FUNCTION set_updated_at_unix_timestamp();",
            t = Self::TABLE_NAME
        )
    }
}

/// Trait for CRUD (Create, Read, Update, Delete) operations for PostgreSQL.
#[async_trait::async_trait]
pub trait SqlxCrud: SqlxSchema + Sized {
    /// Binds the struct fields to an insert query, in COLUMNS order.
    fn bind_insert<'q>(
        &self,
        query: sqlx::query::QueryAs<'q, Postgres, Self::Row, PgArguments>,
    ) -> sqlx::query::QueryAs<'q, Postgres, Self::Row, PgArguments>;

    /// Binds the struct fields to an update query: non-id columns in COLUMNS
    /// order, the primary key last for the WHERE clause.
    fn bind_update<'q>(
        &self,
        query: sqlx::query::QueryAs<'q, Postgres, Self::Row, PgArguments>,
    ) -> sqlx::query::QueryAs<'q, Postgres, Self::Row, PgArguments>;

    /// Creates a new record in the database.
    async fn create<'e, E>(self, executor: E) -> Result<Self, SqlxError>
    where
        E: Executor<'e, Database = Postgres> + Send,
    {
        let sql = Self::insert_sql();
        let row = self.bind_insert(sqlx::query_as(&sql)).fetch_one(executor).await?;
        Ok(Self::from_row(row))
    }

    /// Inserts or overwrites the row sharing `conflict_column` with this one.
    async fn upsert_on<'e, E>(self, conflict_column: &str, executor: E) -> Result<Self, SqlxError>
    where
        E: Executor<'e, Database = Postgres> + Send,
    {
        let sql = Self::upsert_sql(conflict_column);
        let row = self.bind_insert(sqlx::query_as(&sql)).fetch_one(executor).await?;
        Ok(Self::from_row(row))
    }

    /// Finds a record by its primary key.
    async fn find_by_id<'e, E>(id: Self::Id, executor: E) -> Result<Option<Self>, SqlxError>
    where
        E: Executor<'e, Database = Postgres> + Send,
    {
        let sql = Self::select_by_id_sql();
        let row: Option<Self::Row> = sqlx::query_as(&sql).bind(id).fetch_optional(executor).await?;
        Ok(row.map(Self::from_row))
    }

    /// Updates an existing record, identified by its primary key. Fails with
    /// `RowNotFound` when no such row exists.
    async fn update<'e, E>(self, executor: E) -> Result<Self, SqlxError>
    where
        E: Executor<'e, Database = Postgres> + Send,
    {
        let sql = Self::update_by_id_sql();
        let row = self.bind_update(sqlx::query_as(&sql)).fetch_one(executor).await?;
        Ok(Self::from_row(row))
    }

    /// Deletes a record by its primary key, returning the rows affected.
    async fn delete<'e, E>(self, executor: E) -> Result<u64, SqlxError>
    where
        E: Executor<'e, Database = Postgres> + Send,
    {
        let sql = Self::delete_by_id_sql();
        let result = sqlx::query(&sql).bind(self.get_id_value()).execute(executor).await?;
        Ok(result.rows_affected())
    }

    /// Retrieves all records from the table.
    async fn find_all<'e, E>(executor: E) -> Result<Vec<Self>, SqlxError>
    where
        E: Executor<'e, Database = Postgres> + Send,
    {
        let sql = Self::select_all_sql();
        let rows: Vec<Self::Row> = sqlx::query_as(&sql).fetch_all(executor).await?;
        Ok(rows.into_iter().map(Self::from_row).collect())
    }
}

/// Specifies the direction for ordering query results.
#[derive(Debug, Clone, Copy)]
pub enum OrderDirection {
    Asc,
    Desc,
}

impl OrderDirection {
    pub fn as_sql(&self) -> &'static str {
        match self {
            OrderDirection::Asc => "ASC",
            OrderDirection::Desc => "DESC",
        }
    }
}

/// A trait to allow for boxing of different types that can be encoded as sqlx
/// arguments. This is a helper for the `QueryCriteria` struct to store
/// argument values of different types.
pub trait AsSqlxArg: Send + Sync {
    fn add_to_args(&self, args: &mut PgArguments) -> Result<(), SqlxError>;
}

impl<T> AsSqlxArg for T
where
    T: for<'a> sqlx::Encode<'a, Postgres> + sqlx::Type<Postgres> + Send + Sync + Clone + 'static,
{
    fn add_to_args(&self, args: &mut PgArguments) -> Result<(), SqlxError> {
        use sqlx::Arguments;
        args.add(self.clone()).map_err(SqlxError::Encode)
    }
}

/// Represents a single filter condition for a database query.
pub struct FilterCondition {
    pub column: &'static str,
    pub operator: &'static str,
    /// Holds the value for the condition's placeholder, if any.
    pub value: Option<Box<dyn AsSqlxArg>>,
}

/// Represents the complete criteria for a filtered database query.
#[derive(Default)]
pub struct QueryCriteria {
    pub conditions: Vec<FilterCondition>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
    pub order_by: Vec<(&'static str, OrderDirection)>,
}

impl QueryCriteria {
    /// Creates a new, empty `QueryCriteria` builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a filter condition that may or may not have a value.
    pub fn add_filter<V>(mut self, column: &'static str, operator: &'static str, value: Option<V>) -> Self
    where
        V: for<'a> sqlx::Encode<'a, Postgres> + sqlx::Type<Postgres> + Send + Sync + Clone + 'static,
    {
        self.conditions.push(FilterCondition {
            column,
            operator,
            value: value.map(|v| Box::new(v) as Box<dyn AsSqlxArg>),
        });
        self
    }

    /// A convenience method for `add_filter` that requires a value.
    pub fn add_valued_filter<V>(self, column: &'static str, operator: &'static str, value: V) -> Self
    where
        V: for<'a> sqlx::Encode<'a, Postgres> + sqlx::Type<Postgres> + Send + Sync + Clone + 'static,
    {
        self.add_filter(column, operator, Some(value))
    }

    /// Sets the LIMIT for the query.
    pub fn limit(mut self, limit_val: i64) -> Self {
        self.limit = Some(limit_val);
        self
    }

    /// Sets the OFFSET for the query.
    pub fn offset(mut self, offset_val: i64) -> Self {
        self.offset = Some(offset_val);
        self
    }

    /// Adds an ORDER BY clause.
    pub fn order_by(mut self, column: &'static str, direction: OrderDirection) -> Self {
        self.order_by.push((column, direction));
        self
    }

    /// Renders the WHERE / ORDER BY / LIMIT / OFFSET tail of a query together
    /// with its bound arguments. Placeholders are numbered in condition order;
    /// valueless conditions (e.g. `IS NULL`) consume no placeholder.
    pub fn build_clauses(&self) -> Result<(String, PgArguments), SqlxError> {
        let mut args = PgArguments::default();
        let mut sql = String::new();

        if !self.conditions.is_empty() {
            let mut parts = Vec::with_capacity(self.conditions.len());
            let mut placeholder = 0usize;
            for condition in &self.conditions {
                match &condition.value {
                    Some(value) => {
                        placeholder += 1;
                        value.add_to_args(&mut args)?;
                        parts.push(format!(
                            "\"{}\" {} ${}",
                            condition.column, condition.operator, placeholder
                        ));
                    }
                    None => parts.push(format!("\"{}\" {}", condition.column, condition.operator)),
                }
            }
            sql.push_str(" WHERE ");
            sql.push_str(&parts.join(" AND "));
        }

        if !self.order_by.is_empty() {
            let order = self
                .order_by
                .iter()
                .map(|(column, direction)| format!("\"{}\" {}", column, direction.as_sql()))
                .collect::<Vec<_>>()
                .join(", ");
            sql.push_str(" ORDER BY ");
            sql.push_str(&order);
        }

        if let Some(limit) = self.limit {
            sql.push_str(&format!(" LIMIT {}", limit));
        }
        if let Some(offset) = self.offset {
            sql.push_str(&format!(" OFFSET {}", offset));
        }

        Ok((sql, args))
    }
}

/// Trait for finding records based on dynamic filter criteria.
#[async_trait::async_trait]
pub trait SqlxFilterQuery: SqlxSchema + Sized {
    /// Finds records based on the provided criteria.
    async fn find_by_criteria<'e, E>(criteria: QueryCriteria, executor: E) -> Result<Vec<Self>, SqlxError>
    where
        E: Executor<'e, Database = Postgres> + Send,
    {
        let (clauses, args) = criteria.build_clauses()?;
        let sql = format!("{}{}", Self::select_all_sql(), clauses);
        let rows: Vec<Self::Row> = sqlx::query_as_with(&sql, args).fetch_all(executor).await?;
        Ok(rows.into_iter().map(Self::from_row).collect())
    }

    /// Finds a single optional record based on the provided criteria. If
    /// multiple records match, the first one returned by `find_by_criteria`
    /// is taken.
    async fn find_one_by_criteria<'e, E>(
        mut criteria: QueryCriteria,
        executor: E,
    ) -> Result<Option<Self>, SqlxError>
    where
        E: Executor<'e, Database = Postgres> + Send,
    {
        if criteria.limit.is_none() {
            criteria = criteria.limit(1);
        }
        let mut results = Self::find_by_criteria(criteria, executor).await?;
        Ok(results.pop())
    }

    /// Deletes records based on the provided criteria, returning the rows
    /// affected.
    async fn delete_by_criteria<'e, E>(criteria: QueryCriteria, executor: E) -> Result<u64, SqlxError>
    where
        E: Executor<'e, Database = Postgres> + Send,
    {
        let (clauses, args) = criteria.build_clauses()?;
        let sql = format!("DELETE FROM \"{}\"{}", Self::TABLE_NAME, clauses);
        let result = sqlx::query_with(&sql, args).execute(executor).await?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::prelude::FromRow;

    #[derive(Debug, Clone, FromRow)]
    struct NoteRow {
        id: i64,
        title: String,
        body: Option<String>,
        created_at: i64,
        updated_at: i64,
    }

    #[derive(Debug, Clone)]
    struct Note {
        id: i64,
        title: String,
        body: Option<String>,
        created_at: i64,
        updated_at: i64,
    }

    impl SqlxSchema for Note {
        type Id = i64;
        type Row = NoteRow;

        const TABLE_NAME: &'static str = "notes";
        const ID_COLUMN_NAME: &'static str = "id";
        const COLUMNS: &'static [&'static str] = &["id", "title", "body", "created_at", "updated_at"];
        const INDEXES_SQL: &'static [&'static str] = &[];

        fn get_id_value(&self) -> i64 {
            self.id
        }

        fn from_row(row: NoteRow) -> Self {
            Self {
                id: row.id,
                title: row.title,
                body: row.body,
                created_at: row.created_at,
                updated_at: row.updated_at,
            }
        }

        fn create_table_sql() -> String {
            "CREATE TABLE IF NOT EXISTS \"notes\" (id BIGINT PRIMARY KEY);".to_string()
        }
    }

    #[test]
    fn select_sql_lists_all_columns() {
        assert_eq!(
            Note::select_all_sql(),
            "SELECT \"id\", \"title\", \"body\", \"created_at\", \"updated_at\" FROM \"notes\""
        );
        assert_eq!(
            Note::select_by_id_sql(),
            "SELECT \"id\", \"title\", \"body\", \"created_at\", \"updated_at\" FROM \"notes\" WHERE \"id\" = $1"
        );
    }

    #[test]
    fn insert_sql_numbers_placeholders() {
        let sql = Note::insert_sql();
        assert!(sql.starts_with("INSERT INTO \"notes\""));
        assert!(sql.contains("VALUES ($1, $2, $3, $4, $5)"));
        assert!(sql.ends_with("RETURNING \"id\", \"title\", \"body\", \"created_at\", \"updated_at\""));
    }

    #[test]
    fn update_sql_binds_id_last() {
        let sql = Note::update_by_id_sql();
        assert!(sql.contains("SET \"title\" = $1, \"body\" = $2, \"created_at\" = $3, \"updated_at\" = $4"));
        assert!(sql.contains("WHERE \"id\" = $5"));
    }

    #[test]
    fn upsert_sql_overwrites_all_but_key_and_created_at() {
        let sql = Note::upsert_sql("title");
        assert!(sql.contains("ON CONFLICT (\"title\") DO UPDATE SET"));
        assert!(sql.contains("\"body\" = EXCLUDED.\"body\""));
        assert!(sql.contains("\"updated_at\" = EXCLUDED.\"updated_at\""));
        assert!(!sql.contains("\"created_at\" = EXCLUDED"));
        assert!(!sql.contains("\"id\" = EXCLUDED"));
        assert!(!sql.contains("\"title\" = EXCLUDED"));
    }

    #[test]
    fn criteria_builds_where_order_and_limit() {
        let criteria = QueryCriteria::new()
            .add_valued_filter("title", "=", "hello".to_string())
            .add_filter::<String>("body", "IS NOT NULL", None)
            .order_by("created_at", OrderDirection::Desc)
            .limit(10)
            .offset(5);
        let (clauses, _args) = criteria.build_clauses().unwrap();
        assert_eq!(
            clauses,
            " WHERE \"title\" = $1 AND \"body\" IS NOT NULL ORDER BY \"created_at\" DESC LIMIT 10 OFFSET 5"
        );
    }

    #[test]
    fn criteria_placeholders_skip_valueless_conditions() {
        let criteria = QueryCriteria::new()
            .add_filter::<String>("body", "IS NULL", None)
            .add_valued_filter("title", "!=", "x".to_string())
            .add_valued_filter("created_at", ">", 100i64);
        let (clauses, _args) = criteria.build_clauses().unwrap();
        assert_eq!(
            clauses,
            " WHERE \"body\" IS NULL AND \"title\" != $1 AND \"created_at\" > $2"
        );
    }

    #[test]
    fn empty_criteria_builds_no_clauses() {
        let (clauses, _args) = QueryCriteria::new().build_clauses().unwrap();
        assert!(clauses.is_empty());
    }
}
