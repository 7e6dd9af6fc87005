mod copy_worker;
mod external_tool;
mod pooling;
