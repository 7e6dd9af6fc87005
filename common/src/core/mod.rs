pub mod rabbitmq_message_repository;
