// This file is part of mon64.
// Copyright (c) 2016-2019 Sebastian Jastrzebski. All rights reserved.
// Licensed under the GPLv3. See LICENSE file in the project root for full license text.

mod codec;
mod dispatcher;
mod protocol;
mod server;

pub use self::codec::{Reader, Writer};
pub use self::dispatcher::{
    checkpoint_event, jam_event, opened_events, process_command, register_info, resumed_event,
};
pub use self::protocol::{
    BinaryCommand, CheckpointInfo, CommandType, ErrorCode, Response, ResponseType, API_VERSION,
    CHECKPOINT_INFO_LENGTH, EVENT_ID, MAX_BODY_LENGTH, REQUEST_HEADER_LENGTH,
    RESPONSE_HEADER_LENGTH, STX,
};
pub use self::server::{
    Acceptor, BinaryServer, ServerState, TcpAcceptor, TcpTransport, Transport,
};
