//! Column planning shared by every sink.
//!
//! A new target table gets one column per Arrow field, typed by
//! [`PgKind::for_arrow`]. An existing table keeps its declared types and a
//! source column is accepted only through a widening conversion
//! ([`PgKind::accepts`]); a source column the table lacks is rejected.

use std::error::Error;

use arrow::{
    array::{Array, ArrayRef, AsArray},
    compute::{CastOptions, cast_with_options},
    datatypes::{
        DataType, Date32Type, Float32Type, Float64Type, Int16Type, Int32Type, Int64Type, Schema,
        TimeUnit, TimestampMicrosecondType,
    },
    error::ArrowError,
};
use bytes::BytesMut;
use chrono::{NaiveDate, NaiveDateTime};
use snafu::prelude::*;
use tokio_postgres::types::{IsNull, ToSql, Type, to_sql_checked};

use super::{
    ConvertSnafu, LoadResult, SchemaMismatchSnafu, TargetTable, UnsupportedTypeSnafu,
    quote_identifier,
};

/// Column types the loader can write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PgKind {
    /// `BOOLEAN`
    Boolean,
    /// `SMALLINT`
    SmallInt,
    /// `INTEGER`
    Integer,
    /// `BIGINT`
    BigInt,
    /// `REAL`
    Real,
    /// `DOUBLE PRECISION`
    Double,
    /// `TEXT` (also covers `VARCHAR`/`CHAR` targets)
    Text,
    /// `DATE`
    Date,
    /// `TIMESTAMP` (without time zone)
    Timestamp,
}

impl PgKind {
    /// Column type used when creating a table for an Arrow field.
    pub fn for_arrow(data_type: &DataType) -> Option<Self> {
        use DataType::*;
        match data_type {
            Boolean => Some(PgKind::Boolean),
            Int8 | Int16 | Int32 | Int64 | UInt8 | UInt16 | UInt32 | UInt64 => Some(PgKind::BigInt),
            Float16 | Float32 | Float64 | Decimal128(_, _) | Decimal256(_, _) => {
                Some(PgKind::Double)
            }
            Utf8 | LargeUtf8 | Utf8View | Null => Some(PgKind::Text),
            Date32 | Date64 => Some(PgKind::Date),
            Timestamp(_, _) => Some(PgKind::Timestamp),
            _ => None,
        }
    }

    /// Parse a declared SQL type, as spelled in DDL or in
    /// `information_schema.columns.data_type`.
    pub fn parse(sql_type: &str) -> Option<Self> {
        match sql_type.trim().to_ascii_lowercase().as_str() {
            "boolean" | "bool" => Some(PgKind::Boolean),
            "smallint" | "int2" => Some(PgKind::SmallInt),
            "integer" | "int" | "int4" => Some(PgKind::Integer),
            "bigint" | "int8" => Some(PgKind::BigInt),
            "real" | "float4" => Some(PgKind::Real),
            "double precision" | "float8" => Some(PgKind::Double),
            "text" | "character varying" | "varchar" | "character" | "char" => Some(PgKind::Text),
            "date" => Some(PgKind::Date),
            "timestamp" | "timestamp without time zone" => Some(PgKind::Timestamp),
            _ => None,
        }
    }

    /// DDL spelling.
    pub fn ddl(&self) -> &'static str {
        match self {
            PgKind::Boolean => "BOOLEAN",
            PgKind::SmallInt => "SMALLINT",
            PgKind::Integer => "INTEGER",
            PgKind::BigInt => "BIGINT",
            PgKind::Real => "REAL",
            PgKind::Double => "DOUBLE PRECISION",
            PgKind::Text => "TEXT",
            PgKind::Date => "DATE",
            PgKind::Timestamp => "TIMESTAMP",
        }
    }

    /// Wire type for binary COPY.
    pub fn pg_type(&self) -> Type {
        match self {
            PgKind::Boolean => Type::BOOL,
            PgKind::SmallInt => Type::INT2,
            PgKind::Integer => Type::INT4,
            PgKind::BigInt => Type::INT8,
            PgKind::Real => Type::FLOAT4,
            PgKind::Double => Type::FLOAT8,
            PgKind::Text => Type::TEXT,
            PgKind::Date => Type::DATE,
            PgKind::Timestamp => Type::TIMESTAMP,
        }
    }

    /// Arrow type a source column is cast to before encoding.
    fn arrow_type(&self) -> DataType {
        match self {
            PgKind::Boolean => DataType::Boolean,
            PgKind::SmallInt => DataType::Int16,
            PgKind::Integer => DataType::Int32,
            PgKind::BigInt => DataType::Int64,
            PgKind::Real => DataType::Float32,
            PgKind::Double => DataType::Float64,
            PgKind::Text => DataType::Utf8,
            PgKind::Date => DataType::Date32,
            PgKind::Timestamp => DataType::Timestamp(TimeUnit::Microsecond, None),
        }
    }

    /// Whether a source column of `data_type` widens into this column.
    /// All-null columns fit anything.
    ///
    /// Any integer into `DOUBLE PRECISION` counts as widening, so 64-bit
    /// values beyond 2^53 are rounded to the nearest representable float.
    /// Floats never go into integer columns.
    pub fn accepts(&self, data_type: &DataType) -> bool {
        use DataType::*;
        if matches!(data_type, Null) {
            return true;
        }
        match self {
            PgKind::Boolean => matches!(data_type, Boolean),
            PgKind::SmallInt => matches!(data_type, Int8 | Int16 | UInt8),
            PgKind::Integer => matches!(data_type, Int8 | Int16 | Int32 | UInt8 | UInt16),
            PgKind::BigInt => matches!(
                data_type,
                Int8 | Int16 | Int32 | Int64 | UInt8 | UInt16 | UInt32 | UInt64
            ),
            PgKind::Real => matches!(data_type, Float16 | Float32 | Int8 | Int16 | UInt8),
            PgKind::Double => {
                data_type.is_integer()
                    || matches!(
                        data_type,
                        Float16 | Float32 | Float64 | Decimal128(_, _) | Decimal256(_, _)
                    )
            }
            PgKind::Text => matches!(data_type, Utf8 | LargeUtf8 | Utf8View),
            PgKind::Date => matches!(data_type, Date32 | Date64),
            PgKind::Timestamp => matches!(data_type, Timestamp(_, _) | Date32 | Date64),
        }
    }
}

/// A column as declared in an existing target table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExistingColumn {
    /// Column name.
    pub name: String,
    /// Declared SQL type.
    pub data_type: String,
}

/// One column of an append: source field name and the type it is written as.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnPlan {
    /// Column name (same in source and target).
    pub name: String,
    /// Target column type.
    pub kind: PgKind,
}

/// Plan the columns for appending rows of `schema` to `target`.
///
/// `existing` is `None` when the target table does not exist yet.
pub fn plan_columns(
    target: &TargetTable,
    schema: &Schema,
    existing: Option<&[ExistingColumn]>,
) -> LoadResult<Vec<ColumnPlan>> {
    schema
        .fields()
        .iter()
        .map(|field| -> LoadResult<ColumnPlan> {
            let name = field.name();
            let data_type = field.data_type();

            let Some(existing) = existing else {
                let kind = PgKind::for_arrow(data_type).context(UnsupportedTypeSnafu {
                    column: name,
                    data_type: data_type.to_string(),
                })?;
                return Ok(ColumnPlan {
                    name: name.clone(),
                    kind,
                });
            };

            let column = existing
                .iter()
                .find(|c| &c.name == name)
                .context(SchemaMismatchSnafu {
                    target: target.to_string(),
                    column: name,
                    reason: "column does not exist in the target table",
                })?;
            let kind = PgKind::parse(&column.data_type).context(UnsupportedTypeSnafu {
                column: name,
                data_type: &column.data_type,
            })?;
            ensure!(
                kind.accepts(data_type),
                SchemaMismatchSnafu {
                    target: target.to_string(),
                    column: name,
                    reason: format!("cannot store {data_type} in a {} column", kind.ddl()),
                }
            );

            Ok(ColumnPlan {
                name: name.clone(),
                kind,
            })
        })
        .collect()
}

/// `CREATE TABLE IF NOT EXISTS` for a freshly planned target.
pub fn create_table_sql(target: &TargetTable, columns: &[ColumnPlan]) -> String {
    let defs = columns
        .iter()
        .map(|c| format!("{} {}", quote_identifier(&c.name), c.kind.ddl()))
        .collect::<Vec<_>>()
        .join(", ");
    format!("CREATE TABLE IF NOT EXISTS {} ({defs})", target.qualified())
}

/// Binary `COPY ... FROM STDIN` naming the planned columns.
pub fn copy_sql(target: &TargetTable, columns: &[ColumnPlan]) -> String {
    let names = columns
        .iter()
        .map(|c| quote_identifier(&c.name))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "COPY {} ({names}) FROM STDIN (FORMAT binary)",
        target.qualified()
    )
}

/// A single value ready for binary encoding.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    /// `BOOLEAN`
    Bool(Option<bool>),
    /// `SMALLINT`
    Int2(Option<i16>),
    /// `INTEGER`
    Int4(Option<i32>),
    /// `BIGINT`
    Int8(Option<i64>),
    /// `REAL`
    Float4(Option<f32>),
    /// `DOUBLE PRECISION`
    Float8(Option<f64>),
    /// `TEXT`
    Text(Option<String>),
    /// `DATE`
    Date(Option<NaiveDate>),
    /// `TIMESTAMP`
    Timestamp(Option<NaiveDateTime>),
}

impl ToSql for Cell {
    fn to_sql(
        &self,
        ty: &Type,
        out: &mut BytesMut,
    ) -> Result<IsNull, Box<dyn Error + Sync + Send>> {
        match self {
            Cell::Bool(v) => v.to_sql(ty, out),
            Cell::Int2(v) => v.to_sql(ty, out),
            Cell::Int4(v) => v.to_sql(ty, out),
            Cell::Int8(v) => v.to_sql(ty, out),
            Cell::Float4(v) => v.to_sql(ty, out),
            Cell::Float8(v) => v.to_sql(ty, out),
            Cell::Text(v) => v.to_sql(ty, out),
            Cell::Date(v) => v.to_sql(ty, out),
            Cell::Timestamp(v) => v.to_sql(ty, out),
        }
    }

    fn accepts(ty: &Type) -> bool {
        matches!(
            *ty,
            Type::BOOL
                | Type::INT2
                | Type::INT4
                | Type::INT8
                | Type::FLOAT4
                | Type::FLOAT8
                | Type::TEXT
                | Type::DATE
                | Type::TIMESTAMP
        )
    }

    to_sql_checked!();
}

fn downcast_failed(kind: PgKind) -> ArrowError {
    ArrowError::CastError(format!("cast did not produce {}", kind.ddl()))
}

/// Convert a source column into cells of `kind`.
///
/// Casts are strict: a value that does not fit (for example an unsigned
/// integer above `i64::MAX`) is an error, never a silent null.
pub fn column_cells(name: &str, array: &ArrayRef, kind: PgKind) -> LoadResult<Vec<Cell>> {
    let options = CastOptions {
        safe: false,
        ..Default::default()
    };
    let cast = cast_with_options(array, &kind.arrow_type(), &options)
        .context(ConvertSnafu { column: name })?;

    let cells: Option<Vec<Cell>> = match kind {
        PgKind::Boolean => cast
            .as_boolean_opt()
            .map(|a| a.iter().map(Cell::Bool).collect()),
        PgKind::SmallInt => cast
            .as_primitive_opt::<Int16Type>()
            .map(|a| a.iter().map(Cell::Int2).collect()),
        PgKind::Integer => cast
            .as_primitive_opt::<Int32Type>()
            .map(|a| a.iter().map(Cell::Int4).collect()),
        PgKind::BigInt => cast
            .as_primitive_opt::<Int64Type>()
            .map(|a| a.iter().map(Cell::Int8).collect()),
        PgKind::Real => cast
            .as_primitive_opt::<Float32Type>()
            .map(|a| a.iter().map(Cell::Float4).collect()),
        PgKind::Double => cast
            .as_primitive_opt::<Float64Type>()
            .map(|a| a.iter().map(Cell::Float8).collect()),
        PgKind::Text => cast
            .as_string_opt::<i32>()
            .map(|a| a.iter().map(|v| Cell::Text(v.map(str::to_owned))).collect()),
        PgKind::Date => cast.as_primitive_opt::<Date32Type>().map(|a| {
            (0..a.len())
                .map(|i| Cell::Date(a.is_valid(i).then(|| a.value_as_date(i)).flatten()))
                .collect()
        }),
        PgKind::Timestamp => cast
            .as_primitive_opt::<TimestampMicrosecondType>()
            .map(|a| {
                (0..a.len())
                    .map(|i| {
                        Cell::Timestamp(a.is_valid(i).then(|| a.value_as_datetime(i)).flatten())
                    })
                    .collect()
            }),
    };

    cells
        .ok_or_else(|| downcast_failed(kind))
        .context(ConvertSnafu { column: name })
}
