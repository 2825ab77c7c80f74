mod postgres_connect;
mod sqlx_postgres;

pub use sqlx_postgres::{
    AsSqlxArg, FilterCondition, OrderDirection, QueryCriteria, SqlxCrud, SqlxFilterQuery,
    SqlxSchema,
};
