pub(crate) mod answer_key;
pub(crate) mod consistency;
pub(crate) mod ingest;
pub(crate) mod integrity;
pub(crate) mod review;
