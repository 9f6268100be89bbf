//! Tool module tests through the full stack: MCP endpoint, tool module,
//! Falcon API client and identity exchange, with the API mocked.
