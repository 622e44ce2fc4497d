//! Databases, tables, writes and secondary indexes.

use crate::reql::ast::Term;
use crate::reql::func::func_wrap;
use crate::reql::terms::TermType;

impl Term {
    /// Table inside this database
    pub fn table<S: Into<Term>>(&self, name: S) -> Term {
        self.chain1(TermType::Table, name)
    }

    pub fn table_create<S: Into<Term>>(&self, name: S) -> Term {
        self.chain1(TermType::TableCreate, name)
    }

    pub fn table_drop<S: Into<Term>>(&self, name: S) -> Term {
        self.chain1(TermType::TableDrop, name)
    }

    pub fn table_list(&self) -> Term {
        self.chain(TermType::TableList)
    }

    /// Row by primary key
    pub fn get<K: Into<Term>>(&self, key: K) -> Term {
        self.chain1(TermType::Get, key)
    }

    /// Rows by primary key, or by a secondary index with `.opts(..index..)`
    pub fn get_all<I, K>(&self, keys: I) -> Term
    where
        I: IntoIterator<Item = K>,
        K: Into<Term>,
    {
        self.chain_many(TermType::GetAll, keys)
    }

    pub fn insert<D: Into<Term>>(&self, documents: D) -> Term {
        self.chain1(TermType::Insert, documents)
    }

    pub fn update<D: Into<Term>>(&self, change: D) -> Term {
        self.chain_func(TermType::Update, change)
    }

    pub fn replace<D: Into<Term>>(&self, document: D) -> Term {
        self.chain_func(TermType::Replace, document)
    }

    pub fn delete(&self) -> Term {
        self.chain(TermType::Delete)
    }

    /// Flush soft-durability writes to disk
    pub fn sync(&self) -> Term {
        self.chain(TermType::Sync)
    }

    pub fn index_create<S: Into<Term>>(&self, name: S) -> Term {
        self.chain1(TermType::IndexCreate, name)
    }

    /// Index over a computed value
    pub fn index_create_with<S: Into<Term>, F: Into<Term>>(&self, name: S, f: F) -> Term {
        self.chain1(TermType::IndexCreate, name)
            .with_arg(func_wrap(f.into()))
    }

    pub fn index_drop<S: Into<Term>>(&self, name: S) -> Term {
        self.chain1(TermType::IndexDrop, name)
    }

    pub fn index_list(&self) -> Term {
        self.chain(TermType::IndexList)
    }

    pub fn index_rename<A: Into<Term>, B: Into<Term>>(&self, old: A, new: B) -> Term {
        self.chain1(TermType::IndexRename, old).with_arg(new.into())
    }

    pub fn index_status<I, S>(&self, names: I) -> Term
    where
        I: IntoIterator<Item = S>,
        S: Into<Term>,
    {
        self.chain_many(TermType::IndexStatus, names)
    }

    pub fn index_wait<I, S>(&self, names: I) -> Term
    where
        I: IntoIterator<Item = S>,
        S: Into<Term>,
    {
        self.chain_many(TermType::IndexWait, names)
    }

    pub fn config(&self) -> Term {
        self.chain(TermType::Config)
    }

    pub fn status(&self) -> Term {
        self.chain(TermType::Status)
    }

    pub fn wait(&self) -> Term {
        self.chain(TermType::Wait)
    }

    pub fn rebalance(&self) -> Term {
        self.chain(TermType::Rebalance)
    }

    pub fn reconfigure(&self) -> Term {
        self.chain(TermType::Reconfigure)
    }

    pub fn grant<U: Into<Term>, P: Into<Term>>(&self, user: U, permissions: P) -> Term {
        self.chain1(TermType::Grant, user)
            .with_arg(permissions.into())
    }
}
