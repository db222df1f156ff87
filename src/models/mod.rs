pub mod chatmodel;
pub mod quotemodel;
pub mod requestmodel;
pub mod workflowmodel;
