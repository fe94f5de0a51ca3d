mod customers;
mod memory;
mod neo4j;

pub use customers::StoreCustomerDirectory;
pub use memory::InMemoryStore;
pub use neo4j::Neo4jDocumentStore;

pub(crate) fn new_document_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
