mod postgres_repo;
