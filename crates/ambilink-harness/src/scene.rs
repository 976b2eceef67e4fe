//! Scene model and request handling of the simulated companion.

use std::collections::{HashSet, VecDeque};

use ambilink_client::TransportError;
use ambilink_proto::{
    AnimationInfo, CameraSpacePosition, NotificationHeader, NotificationKind, ObjectId, Opcode,
    ProtocolError, Reader, StatusCode, Writer, encode_reply, payloads,
};
use bytes::Bytes;
use crossbeam::channel::{self, Receiver, Sender};

/// One trackable object.
#[derive(Debug, Clone, PartialEq)]
pub struct SimObject {
    /// Companion-assigned id
    pub id: ObjectId,
    /// Current name
    pub name: String,
    /// Position per animation frame
    pub frames: Vec<CameraSpacePosition>,
}

impl SimObject {
    fn position_at(&self, frame: u64) -> CameraSpacePosition {
        usize::try_from(frame)
            .ok()
            .and_then(|index| self.frames.get(index))
            .or(self.frames.last())
            .copied()
            .unwrap_or_default()
    }
}

pub(crate) struct Scene {
    objects: Vec<SimObject>,
    next_id: ObjectId,
    animation: AnimationInfo,
    subscribers: Vec<Sender<Bytes>>,
    pub(crate) subscriptions: HashSet<ObjectId>,
    pub(crate) rendering: bool,
    pub(crate) refuse_dials: usize,
    pub(crate) dial_attempts: usize,
    pub(crate) failing_requests: VecDeque<TransportError>,
    pub(crate) injected_replies: VecDeque<Bytes>,
    pub(crate) request_log: Vec<Opcode>,
    pub(crate) generation: u64,
}

impl Scene {
    pub(crate) fn new(animation: AnimationInfo) -> Self {
        Self {
            objects: Vec::new(),
            next_id: 1,
            animation,
            subscribers: Vec::new(),
            subscriptions: HashSet::new(),
            rendering: false,
            refuse_dials: 0,
            dial_attempts: 0,
            failing_requests: VecDeque::new(),
            injected_replies: VecDeque::new(),
            request_log: Vec::new(),
            generation: 0,
        }
    }

    pub(crate) fn add_object(&mut self, name: &str, frames: Vec<CameraSpacePosition>) -> ObjectId {
        let id = self.next_id;
        self.next_id = self.next_id.wrapping_add(1);
        self.objects.push(SimObject { id, name: name.to_owned(), frames });
        tracing::debug!(id, name, "sim object added");
        id
    }

    pub(crate) fn move_object(&mut self, id: ObjectId, position: CameraSpacePosition) {
        let mut writer = Writer::new();
        NotificationHeader { object_id: id, kind: NotificationKind::PositionUpdated }
            .encode(&mut writer);
        writer.write(position);
        self.notify(id, &writer.finish());
    }

    pub(crate) fn rename_object(&mut self, id: ObjectId, name: &str) {
        let Some(object) = self.objects.iter_mut().find(|o| o.id == id) else {
            return;
        };
        object.name = name.to_owned();

        let mut writer = Writer::new();
        NotificationHeader { object_id: id, kind: NotificationKind::Renamed }.encode(&mut writer);
        if payloads::encode_object_name(&mut writer, name).is_ok() {
            self.notify(id, &writer.finish());
        }
    }

    pub(crate) fn delete_object(&mut self, id: ObjectId) {
        self.objects.retain(|o| o.id != id);

        let mut writer = Writer::new();
        NotificationHeader { object_id: id, kind: NotificationKind::Deleted }.encode(&mut writer);
        self.notify(id, &writer.finish());
        self.subscriptions.remove(&id);
    }

    pub(crate) fn add_subscriber(&mut self) -> Receiver<Bytes> {
        let (sender, receiver) = channel::unbounded();
        self.subscribers.push(sender);
        receiver
    }

    pub(crate) fn broadcast(&mut self, message: &Bytes) {
        self.subscribers.retain(|subscriber| subscriber.send(message.clone()).is_ok());
    }

    pub(crate) fn disconnect_all(&mut self) {
        tracing::debug!(generation = self.generation, "sim companion dropping all channels");
        self.generation += 1;
        self.subscribers.clear();
        self.subscriptions.clear();
        self.rendering = false;
    }

    /// Notifications only go out for subscribed objects.
    fn notify(&mut self, id: ObjectId, message: &Bytes) {
        if self.subscriptions.contains(&id) {
            self.broadcast(message);
        }
    }

    pub(crate) fn handle(&mut self, request: &[u8]) -> Result<Bytes, TransportError> {
        if let Some(error) = self.failing_requests.pop_front() {
            return Err(error);
        }

        let mut reader = Reader::new(Bytes::copy_from_slice(request));
        let Some(opcode) = reader.read::<u8>().ok().and_then(Opcode::from_u8) else {
            return reply(StatusCode::UnknownCommand, &[]);
        };
        self.request_log.push(opcode);
        if let Some(injected) = self.injected_replies.pop_front() {
            return Ok(injected);
        }

        match self.dispatch(opcode, &mut reader) {
            Ok((status, payload)) => reply(status, &payload),
            Err(error) => {
                tracing::debug!(?opcode, %error, "sim companion rejected request");
                reply(StatusCode::InvalidRequestData, &[])
            },
        }
    }

    fn dispatch(
        &mut self,
        opcode: Opcode,
        reader: &mut Reader,
    ) -> Result<(StatusCode, Bytes), ProtocolError> {
        let mut payload = Writer::new();
        let status = match opcode {
            Opcode::ObjectList => {
                for object in &self.objects {
                    payloads::encode_object_name(&mut payload, &object.name)?;
                }
                StatusCode::Success
            },
            Opcode::Subscribe => {
                let name = payloads::decode_object_name(reader)?;
                match self.objects.iter().find(|o| o.name == name) {
                    Some(object) => {
                        self.subscriptions.insert(object.id);
                        payload.write(object.id);
                        StatusCode::Success
                    },
                    None => StatusCode::ObjectNotFound,
                }
            },
            Opcode::Unsubscribe => {
                let id = reader.read::<ObjectId>()?;
                self.subscriptions.remove(&id);
                StatusCode::Success
            },
            Opcode::PrepareToRender => {
                self.rendering = true;
                StatusCode::Success
            },
            Opcode::InformRenderFinished => {
                self.rendering = false;
                StatusCode::Success
            },
            Opcode::GetRenderingLocationData => {
                let id = reader.read::<ObjectId>()?;
                let first = reader.read::<u64>()?;
                let last = reader.read::<u64>()?;
                if last < first {
                    return Err(ProtocolError::InvalidRequestData);
                }
                match self.objects.iter().find(|o| o.id == id) {
                    Some(object) => {
                        for frame in first..=last {
                            payload.write(object.position_at(frame));
                        }
                        StatusCode::Success
                    },
                    None => StatusCode::ObjectNotFound,
                }
            },
            Opcode::GetAnimationInfo => {
                self.animation.encode(&mut payload);
                StatusCode::Success
            },
            Opcode::Ping => StatusCode::Success,
        };
        Ok((status, payload.finish()))
    }
}

fn reply(status: StatusCode, payload: &[u8]) -> Result<Bytes, TransportError> {
    encode_reply(status, payload).map_err(|error| TransportError::Io {
        kind: std::io::ErrorKind::InvalidData,
        message: error.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scene() -> Scene {
        Scene::new(AnimationInfo { frame_count: 3, fps: 24.0 })
    }

    fn request(opcode: Opcode, f: impl FnOnce(&mut Writer)) -> Bytes {
        let mut payload = Writer::new();
        f(&mut payload);
        ambilink_proto::encode_request(opcode, &payload.finish()).unwrap()
    }

    #[test]
    fn subscribe_by_name() {
        let mut scene = scene();
        let id = scene.add_object("Cube", vec![]);

        let reply = scene.handle(&payloads::subscribe_request("Cube").unwrap()).unwrap();
        assert_eq!(reply[0], StatusCode::Success.to_u8());
        assert_eq!(&reply[1..], &id.to_ne_bytes());
        assert!(scene.subscriptions.contains(&id));

        let reply = scene.handle(&payloads::subscribe_request("Ghost").unwrap()).unwrap();
        assert_eq!(reply[..], [StatusCode::ObjectNotFound.to_u8()]);
    }

    #[test]
    fn location_data_clamps_to_last_frame() {
        let mut scene = scene();
        let id = scene.add_object("Cube", vec![
            CameraSpacePosition::new(0.0, 0.0, 1.0),
            CameraSpacePosition::new(0.0, 0.0, 2.0),
        ]);

        let reply =
            scene.handle(&payloads::location_data_request(id, 0, 2).unwrap()).unwrap();
        let mut reader = Reader::new(reply);
        assert_eq!(reader.read::<u8>().unwrap(), 0);
        let positions = payloads::decode_positions(&mut reader, 3).unwrap();
        assert_eq!(positions[2], CameraSpacePosition::new(0.0, 0.0, 2.0));
    }

    #[test]
    fn malformed_payload_is_invalid_request_data() {
        let mut scene = scene();
        let reply = scene.handle(&request(Opcode::Unsubscribe, |w| {
            w.write(1u8);
        }));
        assert_eq!(reply.unwrap()[..], [StatusCode::InvalidRequestData.to_u8()]);
    }

    #[test]
    fn unknown_opcode_is_unknown_command() {
        let mut scene = scene();
        assert_eq!(scene.handle(&[0x42]).unwrap()[..], [StatusCode::UnknownCommand.to_u8()]);
        assert!(scene.request_log.is_empty());
    }

    #[test]
    fn notifications_only_for_subscribed_objects() {
        let mut scene = scene();
        let receiver = scene.add_subscriber();
        let watched = scene.add_object("Cube", vec![]);
        let other = scene.add_object("Cam", vec![]);
        scene.subscriptions.insert(watched);

        scene.move_object(other, CameraSpacePosition::new(1.0, 0.0, 0.0));
        scene.move_object(watched, CameraSpacePosition::new(1.0, 0.0, 0.0));

        let message = receiver.try_recv().unwrap();
        let header = NotificationHeader::decode(&mut Reader::new(message)).unwrap();
        assert_eq!(header.object_id, watched);
        assert!(receiver.try_recv().is_err());
    }
}
