use chumsky::prelude::*;

use crate::condition::CompOp;
use crate::record::AttrType;

use super::ast::{
    ColumnDef, ColumnRef, Condition, Literal, Operand, SelectStmt, Selector, Selectors, Statement,
    classify_string,
};
use super::lexer::{Keyword as K, SqlToken as T};

type TokenInput<'a> = &'a [T<'a>];
type TErr<'a> = extra::Err<Rich<'a, T<'a>>>;

fn kw<'a>(k: K) -> impl Parser<'a, TokenInput<'a>, T<'a>, TErr<'a>> + Clone {
    just(T::Keyword(k))
}

pub fn parser<'a>() -> impl Parser<'a, TokenInput<'a>, Vec<Statement>, TErr<'a>> {
    let identifier = select! { T::Identifier(name) => name.to_string() }.boxed();

    let literal = choice((
        select! {
            T::Integer(i) => Literal::Int(i as i32),
            T::Float(f) => Literal::Float(f as f32),
        },
        kw(K::Null).to(Literal::Null),
        select! { T::String(s) => s }.map(classify_string),
    ))
    .boxed();

    // col, table.col, table.*
    let column_ref = identifier
        .clone()
        .then(
            just(T::Symbol('.'))
                .ignore_then(
                    select! { T::Identifier(c) => c.to_string() }
                        .or(just(T::Symbol('*')).to("*".to_string())),
                )
                .or_not(),
        )
        .map(|(first, second)| match second {
            Some(column) => ColumnRef {
                table: Some(first),
                column,
            },
            None => ColumnRef {
                table: None,
                column: first,
            },
        })
        .boxed();

    let comp_op = select! { T::Op(op) => op };

    let operand = literal
        .clone()
        .map(Operand::Literal)
        .or(column_ref.clone().map(Operand::Column))
        .boxed();

    let is_null_cond = column_ref
        .clone()
        .then(kw(K::Is).ignore_then(kw(K::Not).or_not()).then_ignore(kw(K::Null)))
        .map(|(col, not)| {
            if not.is_some() {
                Condition::IsNotNull(col)
            } else {
                Condition::IsNull(col)
            }
        });

    let in_cond = column_ref
        .clone()
        .then_ignore(kw(K::In))
        .then(
            literal
                .clone()
                .separated_by(just(T::Symbol(',')))
                .at_least(1)
                .collect::<Vec<_>>()
                .delimited_by(just(T::Symbol('(')), just(T::Symbol(')'))),
        )
        .map(|(col, values)| Condition::In(col, values));

    let compare_cond = column_ref
        .clone()
        .then(comp_op)
        .then(operand.clone())
        .map(|((col, op), rhs)| Condition::Compare(Operand::Column(col), op, rhs));

    let condition = choice((is_null_cond, in_cond, compare_cond)).boxed();

    let where_clause = kw(K::Where)
        .ignore_then(
            condition
                .separated_by(kw(K::And))
                .at_least(1)
                .collect::<Vec<_>>(),
        )
        .or_not()
        .map(Option::unwrap_or_default)
        .boxed();

    let column_type = choice((
        kw(K::Int).to(AttrType::Int),
        kw(K::Float).to(AttrType::Float),
        kw(K::Date).to(AttrType::Date),
        kw(K::Char)
            .ignore_then(
                select! { T::Integer(n) => n }
                    .delimited_by(just(T::Symbol('(')), just(T::Symbol(')'))),
            )
            .map(|n| AttrType::Chars(n.max(1) as usize)),
    ));

    let column_def = identifier
        .clone()
        .then(column_type)
        .then(
            choice((
                kw(K::Nullable).to(true),
                kw(K::Not).ignore_then(kw(K::Null)).to(false),
            ))
            .or_not(),
        )
        .map(|((name, attr_type), nullable)| ColumnDef {
            name,
            attr_type,
            nullable: nullable.unwrap_or(false),
        })
        .boxed();

    let create_table = kw(K::Create)
        .ignore_then(kw(K::Table))
        .ignore_then(identifier.clone())
        .then(
            column_def
                .separated_by(just(T::Symbol(',')))
                .at_least(1)
                .collect::<Vec<_>>()
                .delimited_by(just(T::Symbol('(')), just(T::Symbol(')'))),
        )
        .map(|(table, columns)| Statement::CreateTable(table, columns));

    let drop_table = kw(K::Drop)
        .ignore_then(kw(K::Table))
        .ignore_then(identifier.clone())
        .map(Statement::DropTable);

    let show_tables = kw(K::Show)
        .ignore_then(kw(K::Tables))
        .to(Statement::ShowTables);

    let desc = kw(K::Desc)
        .ignore_then(identifier.clone())
        .map(Statement::Desc);

    let create_index = kw(K::Create)
        .ignore_then(kw(K::Index))
        .ignore_then(identifier.clone())
        .then_ignore(kw(K::On))
        .then(identifier.clone())
        .then(
            identifier
                .clone()
                .delimited_by(just(T::Symbol('(')), just(T::Symbol(')'))),
        )
        .map(|((index, table), column)| Statement::CreateIndex {
            index,
            table,
            column,
        });

    let drop_index = kw(K::Drop)
        .ignore_then(kw(K::Index))
        .ignore_then(identifier.clone())
        .then_ignore(kw(K::On))
        .then(identifier.clone())
        .map(|(index, table)| Statement::DropIndex { index, table });

    let value_row = literal
        .clone()
        .separated_by(just(T::Symbol(',')))
        .at_least(1)
        .collect::<Vec<_>>()
        .delimited_by(just(T::Symbol('(')), just(T::Symbol(')')))
        .boxed();

    let insert = kw(K::Insert)
        .ignore_then(kw(K::Into))
        .ignore_then(identifier.clone())
        .then_ignore(kw(K::Values))
        .then(
            value_row
                .separated_by(just(T::Symbol(',')))
                .at_least(1)
                .collect::<Vec<_>>(),
        )
        .map(|(table, rows)| Statement::Insert(table, rows));

    let count_selector = kw(K::Count).ignore_then(
        just(T::Symbol('*'))
            .to(Selector::CountAll)
            .or(column_ref.clone().map(Selector::Count))
            .delimited_by(just(T::Symbol('(')), just(T::Symbol(')'))),
    );

    let aggregate = |keyword: K, build: fn(ColumnRef) -> Selector| {
        kw(keyword).ignore_then(
            column_ref
                .clone()
                .delimited_by(just(T::Symbol('(')), just(T::Symbol(')')))
                .map(build),
        )
    };

    let selector = choice((
        count_selector,
        aggregate(K::Avg, Selector::Average),
        aggregate(K::Max, Selector::Max),
        aggregate(K::Min, Selector::Min),
        aggregate(K::Sum, Selector::Sum),
        column_ref.clone().map(Selector::Column),
    ))
    .boxed();

    let selectors = just(T::Symbol('*')).to(Selectors::All).or(selector
        .separated_by(just(T::Symbol(',')))
        .at_least(1)
        .collect::<Vec<_>>()
        .map(Selectors::List));

    let order_by = kw(K::Order)
        .ignore_then(kw(K::By))
        .ignore_then(
            column_ref
                .clone()
                .then(choice((kw(K::Asc).to(true), kw(K::Desc).to(false))).or_not()),
        )
        .map(|(col, asc)| (col, asc.unwrap_or(true)));

    let select = kw(K::Select)
        .ignore_then(selectors)
        .then_ignore(kw(K::From))
        .then(identifier.clone())
        .then(where_clause.clone())
        .then(
            kw(K::Group)
                .ignore_then(kw(K::By))
                .ignore_then(column_ref.clone())
                .or_not(),
        )
        .then(order_by.or_not())
        .then(
            kw(K::Limit)
                .ignore_then(select! { T::Integer(n) => n.max(0) as usize })
                .or_not(),
        )
        .then(
            kw(K::Offset)
                .ignore_then(select! { T::Integer(n) => n.max(0) as usize })
                .or_not(),
        )
        .map(
            |((((((selectors, table), conditions), group_by), order_by), limit), offset)| {
                Statement::Select(SelectStmt {
                    selectors,
                    table,
                    conditions,
                    group_by,
                    order_by,
                    limit,
                    offset,
                })
            },
        );

    let update = kw(K::Update)
        .ignore_then(identifier.clone())
        .then_ignore(kw(K::Set))
        .then(identifier.clone())
        .then_ignore(just(T::Op(CompOp::Eq)))
        .then(literal.clone())
        .then(where_clause.clone())
        .map(|(((table, column), value), conditions)| Statement::Update {
            table,
            column,
            value,
            conditions,
        });

    let delete = kw(K::Delete)
        .ignore_then(kw(K::From))
        .ignore_then(identifier.clone())
        .then(where_clause.clone())
        .map(|(table, conditions)| Statement::Delete { table, conditions });

    let load_data = kw(K::Load)
        .ignore_then(kw(K::Data))
        .ignore_then(kw(K::Infile))
        .ignore_then(select! { T::String(s) => s.to_string() })
        .then_ignore(kw(K::Into))
        .then_ignore(kw(K::Table))
        .then(identifier.clone())
        .then(
            kw(K::Fields)
                .ignore_then(kw(K::Terminated))
                .ignore_then(kw(K::By))
                .ignore_then(select! { T::String(s) => s.to_string() })
                .or_not(),
        )
        .map(|((path, table), delimiter)| {
            let delimiter = match delimiter.as_deref() {
                // "\t" written as an escape in the SQL text
                Some("\\t") => b'\t',
                Some(d) => d.as_bytes().first().copied().unwrap_or(b','),
                None => b',',
            };
            Statement::LoadData {
                path,
                table,
                delimiter,
            }
        });

    let statement = choice((
        create_table,
        create_index,
        drop_table,
        drop_index,
        show_tables,
        desc,
        insert,
        select,
        update,
        delete,
        load_data,
        kw(K::Begin).to(Statement::Begin),
        kw(K::Commit).to(Statement::Commit),
        kw(K::Rollback).to(Statement::Rollback),
        kw(K::Sync).to(Statement::Sync),
        kw(K::Help).to(Statement::Help),
        kw(K::Exit).to(Statement::Exit),
    ))
    .boxed();

    statement
        .then_ignore(just(T::Symbol(';')).repeated().at_least(1))
        .repeated()
        .collect()
}
